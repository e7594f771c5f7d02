use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::lifecycle::OrderLifecycle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleStoreError {
    #[error("lifecycle already exists: {0}")]
    AlreadyExists(String),

    #[error("lifecycle not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable per-order lifecycle records.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn create(&self, lifecycle: &OrderLifecycle) -> Result<(), LifecycleStoreError>;

    /// Replace an existing record
    async fn save(&self, lifecycle: &OrderLifecycle) -> Result<(), LifecycleStoreError>;

    async fn get(&self, lifecycle_id: &str) -> Result<Option<OrderLifecycle>, LifecycleStoreError>;

    /// Non-terminal lifecycles, oldest first
    async fn list_open(&self) -> Result<Vec<OrderLifecycle>, LifecycleStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLifecycleStore {
    lifecycles: RwLock<HashMap<String, OrderLifecycle>>,
}

impl InMemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.lifecycles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lifecycles.read().await.is_empty()
    }
}

#[async_trait]
impl LifecycleStore for InMemoryLifecycleStore {
    async fn create(&self, lifecycle: &OrderLifecycle) -> Result<(), LifecycleStoreError> {
        let mut lifecycles = self.lifecycles.write().await;
        if lifecycles.contains_key(&lifecycle.lifecycle_id) {
            return Err(LifecycleStoreError::AlreadyExists(
                lifecycle.lifecycle_id.clone(),
            ));
        }
        lifecycles.insert(lifecycle.lifecycle_id.clone(), lifecycle.clone());
        Ok(())
    }

    async fn save(&self, lifecycle: &OrderLifecycle) -> Result<(), LifecycleStoreError> {
        let mut lifecycles = self.lifecycles.write().await;
        match lifecycles.get_mut(&lifecycle.lifecycle_id) {
            Some(existing) => {
                *existing = lifecycle.clone();
                Ok(())
            }
            None => Err(LifecycleStoreError::NotFound(lifecycle.lifecycle_id.clone())),
        }
    }

    async fn get(&self, lifecycle_id: &str) -> Result<Option<OrderLifecycle>, LifecycleStoreError> {
        Ok(self.lifecycles.read().await.get(lifecycle_id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<OrderLifecycle>, LifecycleStoreError> {
        let mut open: Vec<_> = self
            .lifecycles
            .read()
            .await
            .values()
            .filter(|l| !l.state.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.lifecycle_id.cmp(&b.lifecycle_id))
        });
        Ok(open)
    }
}
