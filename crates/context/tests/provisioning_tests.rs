use meropools_context::{
    ContextError, ContextRecordStore, DefaultContextService, FileRecordStore, InMemoryEngine,
    MemoryRecordStore, NodeAdmin, ProvisioningConfig,
};
use meropools_types::{DefaultContextRecord, DEFAULT_CONTEXT_NAME};
use std::sync::Arc;
use std::time::Duration;

fn config() -> ProvisioningConfig {
    ProvisioningConfig {
        application_id: "meropools-app".to_string(),
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn service(
    engine: Arc<InMemoryEngine>,
    store: Arc<dyn ContextRecordStore>,
) -> DefaultContextService {
    DefaultContextService::new(engine, store, config())
}

#[tokio::test]
async fn test_creates_and_persists_when_nothing_exists() {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let service = service(engine.clone(), store.clone());

    let ensured = service.ensure_default_context().await.unwrap();

    assert!(ensured.was_created);
    assert!(ensured.record.is_valid());
    assert_eq!(ensured.record.application_id, "meropools-app");
    assert_eq!(store.load().await.unwrap(), Some(ensured.record.clone()));
    assert!(engine.is_member(&ensured.record.context_id, &ensured.record.member_public_key).await);
}

#[tokio::test]
async fn test_reuses_valid_stored_record() {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let service = service(engine.clone(), store.clone());

    let first = service.ensure_default_context().await.unwrap();
    let second = service.ensure_default_context().await.unwrap();

    assert!(!second.was_created);
    assert_eq!(first.record, second.record);
    assert_eq!(engine.call_count("create_context").await, 1);
}

#[tokio::test]
async fn test_finds_existing_context_on_node() {
    let engine = Arc::new(InMemoryEngine::new());
    let existing = service(engine.clone(), Arc::new(MemoryRecordStore::new()))
        .ensure_default_context()
        .await
        .unwrap();

    // A fresh store on the same node discovers the context instead of creating one
    let store = Arc::new(MemoryRecordStore::new());
    let ensured = service(engine.clone(), store.clone())
        .ensure_default_context()
        .await
        .unwrap();

    assert!(!ensured.was_created);
    assert_eq!(ensured.record.context_id, existing.record.context_id);
    assert_eq!(engine.call_count("create_context").await, 1);
    assert!(store.load().await.unwrap().is_some());
}

#[tokio::test]
async fn test_invalid_record_cleared_and_reprovisioned() {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    store
        .save(&DefaultContextRecord {
            context_id: "gone".to_string(),
            member_public_key: "pk".to_string(),
            executor_id: "pk".to_string(),
            application_id: "meropools-app".to_string(),
            context_name: DEFAULT_CONTEXT_NAME.to_string(),
            is_private: true,
        })
        .await
        .unwrap();

    let ensured = service(engine, store.clone())
        .ensure_default_context()
        .await
        .unwrap();

    assert!(ensured.was_created);
    assert_ne!(ensured.record.context_id, "gone");
    assert_eq!(store.load().await.unwrap().unwrap().context_id, ensured.record.context_id);
}

#[tokio::test]
async fn test_removed_context_is_reprovisioned() {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(MemoryRecordStore::new());
    let service = service(engine.clone(), store);

    let first = service.ensure_default_context().await.unwrap();
    engine.remove_context(&first.record.context_id).await;

    let second = service.ensure_default_context().await.unwrap();
    assert!(second.was_created);
    assert_ne!(first.record.context_id, second.record.context_id);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_attempt() {
    let engine = Arc::new(InMemoryEngine::new());
    engine.set_admin_latency(Duration::from_millis(20)).await;
    let service = Arc::new(service(engine.clone(), Arc::new(MemoryRecordStore::new())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.ensure_default_context().await })
        })
        .collect();

    let mut context_ids = Vec::new();
    for handle in handles {
        context_ids.push(handle.await.unwrap().unwrap().record.context_id);
    }

    context_ids.dedup();
    assert_eq!(context_ids.len(), 1);
    assert_eq!(engine.call_count("create_context").await, 1);
}

#[tokio::test]
async fn test_guard_released_after_failure() {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .fail_next(
            "create_context",
            3,
            ContextError::Transient("node busy".to_string()),
        )
        .await;
    let service = service(engine.clone(), Arc::new(MemoryRecordStore::new()));

    let err = service.ensure_default_context().await.unwrap_err();
    assert_eq!(err, ContextError::ProvisioningTimeout { attempts: 3 });
    assert_eq!(engine.call_count("create_context").await, 3);

    // The failed attempt does not stay cached
    let ensured = service.ensure_default_context().await.unwrap();
    assert!(ensured.was_created);
}

#[tokio::test]
async fn test_transient_creation_failure_retried() {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .fail_next(
            "create_context",
            1,
            ContextError::Transient("node busy".to_string()),
        )
        .await;

    let ensured = service(engine.clone(), Arc::new(MemoryRecordStore::new()))
        .ensure_default_context()
        .await
        .unwrap();

    assert!(ensured.was_created);
    assert_eq!(engine.call_count("create_context").await, 2);
}

#[tokio::test]
async fn test_rejected_creation_not_retried() {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .fail_next(
            "create_context",
            1,
            ContextError::Rejected("application not installed".to_string()),
        )
        .await;

    let err = service(engine.clone(), Arc::new(MemoryRecordStore::new()))
        .ensure_default_context()
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::Rejected(_)));
    assert_eq!(engine.call_count("create_context").await, 1);
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileRecordStore::new(dir.path().join("state").join("default_context.json"));

    assert_eq!(store.load().await.unwrap(), None);

    let engine = Arc::new(InMemoryEngine::new());
    let membership = engine
        .create_context("meropools-app", &meropools_context::ContextInit::default_private())
        .await
        .unwrap();
    let record = DefaultContextRecord {
        context_id: membership.context_id,
        member_public_key: membership.member_public_key.clone(),
        executor_id: membership.member_public_key,
        application_id: "meropools-app".to_string(),
        context_name: DEFAULT_CONTEXT_NAME.to_string(),
        is_private: true,
    };

    store.save(&record).await.unwrap();
    assert_eq!(store.load().await.unwrap(), Some(record));

    store.clear().await.unwrap();
    assert_eq!(store.load().await.unwrap(), None);
    store.clear().await.unwrap();
}

#[tokio::test]
async fn test_file_store_ignores_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("default_context.json");
    std::fs::write(&path, "not json").unwrap();

    assert_eq!(FileRecordStore::new(path).load().await.unwrap(), None);
}
