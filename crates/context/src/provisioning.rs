//! Default private context provisioning.
//!
//! Each trader scopes private-context calls through one private context named
//! `default`. [`DefaultContextService`] finds, validates or creates it, and
//! guarantees that concurrent callers share a single in-flight attempt.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use meropools_ratelimit::Backoff;
use meropools_types::{DefaultContextRecord, DEFAULT_CONTEXT_NAME};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{CallScope, ContextError, ContextInit, NodeAdmin, Result};

/// Where the default context record is persisted between sessions.
#[async_trait]
pub trait ContextRecordStore: Send + Sync {
    async fn load(&self) -> Result<Option<DefaultContextRecord>>;
    async fn save(&self, record: &DefaultContextRecord) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryRecordStore {
    record: RwLock<Option<DefaultContextRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextRecordStore for MemoryRecordStore {
    async fn load(&self) -> Result<Option<DefaultContextRecord>> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &DefaultContextRecord) -> Result<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.record.write().await = None;
        Ok(())
    }
}

/// JSON file holding the record. A missing or unreadable file means no record.
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ContextRecordStore for FileRecordStore {
    async fn load(&self) -> Result<Option<DefaultContextRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ContextError::RecordStore(e.to_string())),
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable context record");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &DefaultContextRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ContextError::RecordStore(e.to_string()))?;
            }
        }
        let contents = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| ContextError::RecordStore(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContextError::RecordStore(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    pub application_id: String,
    /// Creation attempts before giving up
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ProvisioningConfig {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            ..Self::default()
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Result of [`DefaultContextService::ensure_default_context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredContext {
    pub record: DefaultContextRecord,
    pub was_created: bool,
}

impl EnsuredContext {
    pub fn scope(&self) -> CallScope {
        CallScope::new(&self.record.context_id, &self.record.member_public_key)
    }
}

type InFlight = Shared<BoxFuture<'static, Result<EnsuredContext>>>;

pub struct DefaultContextService {
    admin: Arc<dyn NodeAdmin>,
    store: Arc<dyn ContextRecordStore>,
    config: ProvisioningConfig,
    in_flight: Mutex<Option<InFlight>>,
}

impl DefaultContextService {
    pub fn new(
        admin: Arc<dyn NodeAdmin>,
        store: Arc<dyn ContextRecordStore>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            admin,
            store,
            config,
            in_flight: Mutex::new(None),
        }
    }

    /// Stored record without touching the node.
    pub async fn stored(&self) -> Result<Option<DefaultContextRecord>> {
        self.store.load().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Return a valid default context, provisioning one if needed.
    ///
    /// Concurrent callers await the same attempt. The slot is released once
    /// the attempt resolves, whether it succeeded or failed.
    pub async fn ensure_default_context(&self) -> Result<EnsuredContext> {
        let attempt = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(attempt) => attempt.clone(),
                None => {
                    let attempt = provision(
                        self.admin.clone(),
                        self.store.clone(),
                        self.config.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&attempt)) {
            *slot = None;
        }
        result
    }
}

async fn provision(
    admin: Arc<dyn NodeAdmin>,
    store: Arc<dyn ContextRecordStore>,
    config: ProvisioningConfig,
) -> Result<EnsuredContext> {
    if let Some(record) = store.load().await? {
        if is_still_valid(admin.as_ref(), &record).await? {
            return Ok(EnsuredContext {
                record,
                was_created: false,
            });
        }
        warn!(context_id = %record.context_id, "Stored default context is no longer valid, clearing");
        store.clear().await?;
    }

    for info in admin.list_contexts().await? {
        if info.is_default_private() {
            let record = info.into_record();
            info!(context_id = %record.context_id, "Found existing default context");
            store.save(&record).await?;
            return Ok(EnsuredContext {
                record,
                was_created: false,
            });
        }
    }

    let record = create_with_retry(admin.as_ref(), &config).await?;
    store.save(&record).await?;
    info!(context_id = %record.context_id, "Created default context");
    Ok(EnsuredContext {
        record,
        was_created: true,
    })
}

async fn is_still_valid(admin: &dyn NodeAdmin, record: &DefaultContextRecord) -> Result<bool> {
    if !record.is_valid() {
        return Ok(false);
    }
    Ok(admin
        .get_context(&record.context_id)
        .await?
        .is_some_and(|info| info.confirms(record)))
}

async fn create_with_retry(
    admin: &dyn NodeAdmin,
    config: &ProvisioningConfig,
) -> Result<DefaultContextRecord> {
    let attempts = config.max_attempts.max(1);
    let mut backoff = Backoff::exponential(config.initial_backoff, config.max_backoff)
        .with_max_attempts(attempts - 1);
    let init = ContextInit::default_private();

    loop {
        match admin.create_context(&config.application_id, &init).await {
            Ok(membership) => {
                return Ok(DefaultContextRecord {
                    context_id: membership.context_id,
                    executor_id: membership.member_public_key.clone(),
                    member_public_key: membership.member_public_key,
                    application_id: config.application_id.clone(),
                    context_name: DEFAULT_CONTEXT_NAME.to_string(),
                    is_private: true,
                })
            }
            Err(e) if e.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        attempt = backoff.current_attempt(),
                        error = %e,
                        "Default context creation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(ContextError::ProvisioningTimeout { attempts }),
            },
            Err(e) => return Err(e),
        }
    }
}
