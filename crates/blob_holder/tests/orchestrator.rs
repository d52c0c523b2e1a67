use blob_holder::prelude::*;
use blob_holder::test_utils::LocalBlobService;
use blob_holder_sqlite::HolderDb;
use blob_holder_types::test_utils::info;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn setup(service: Arc<LocalBlobService>, timeout: Duration) -> HolderOrchestrator {
    let store = HolderStoreHandle::load(HolderDb::open_in_memory().unwrap()).unwrap();
    HolderOrchestrator::new(store, service, timeout)
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_failure_is_isolated() {
    blob_holder_trace::test_run();
    let service = Arc::new(LocalBlobService::new());
    service.fail_blob("bad-add");
    service.fail_blob("bad-remove");
    let orchestrator = setup(service.clone(), Duration::from_secs(5));

    orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![
                BlobHolder::new("good-remove", "holder-3"),
                BlobHolder::new("bad-remove", "holder-4"),
            ],
            holders_to_remove: vec![],
        })
        .await
        .unwrap();
    service.heal_blob("bad-remove");
    orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![BlobHolder::new("bad-remove", "holder-4")],
            holders_to_remove: vec![],
        })
        .await
        .unwrap();
    service.fail_blob("bad-remove");

    let result = orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![
                BlobHolder::new("good-add", "holder-1"),
                BlobHolder::new("bad-add", "holder-2"),
            ],
            holders_to_remove: vec![
                BlobHolder::new("good-remove", "holder-3"),
                BlobHolder::new("bad-remove", "holder-4"),
            ],
        })
        .await
        .unwrap();

    assert_eq!(
        ProcessHoldersResult {
            added: vec![BlobHolder::new("good-add", "holder-1")],
            not_added: vec![BlobHolder::new("bad-add", "holder-2")],
            removed: vec![BlobHolder::new("good-remove", "holder-3")],
            not_removed: vec![BlobHolder::new("bad-remove", "holder-4")],
        },
        result
    );

    let store = orchestrator.store().snapshot();
    assert_eq!(Some(&info("holder-1", HolderStatus::Established)), store.get("good-add"));
    assert_eq!(Some(&info("holder-2", HolderStatus::NotEstablished)), store.get("bad-add"));
    assert_eq!(None, store.get("good-remove"));
    assert_eq!(Some(&info("holder-4", HolderStatus::NotRemoved)), store.get("bad-remove"));

    assert_eq!(vec!["holder-1"], service.holders("good-add"));
    assert!(service.holders("good-remove").is_empty());
    assert_eq!(vec!["holder-4"], service.holders("bad-remove"));

    // What the store says is exactly what is on disk.
    assert_eq!(store, orchestrator.store().db().load_stored_holders().unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_item_is_not_established() {
    let service = Arc::new(LocalBlobService::new());
    service.hang_blob("slow");
    let orchestrator = setup(service.clone(), Duration::from_millis(50));

    let result = orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![
                BlobHolder::new("slow", "holder-1"),
                BlobHolder::new("fast", "holder-2"),
            ],
            holders_to_remove: vec![],
        })
        .await
        .unwrap();

    assert_eq!(vec![BlobHolder::new("fast", "holder-2")], result.added);
    assert_eq!(vec![BlobHolder::new("slow", "holder-1")], result.not_added);
    assert_eq!(
        Some(&info("holder-1", HolderStatus::NotEstablished)),
        orchestrator.store().snapshot().get("slow")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_holders_recover_on_retry() {
    let service = Arc::new(LocalBlobService::new());
    service.fail_blob("a");
    let orchestrator = setup(service.clone(), Duration::from_secs(5));

    let result = orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![BlobHolder::new("a", "holder-1")],
            holders_to_remove: vec![],
        })
        .await
        .unwrap();
    assert!(!result.all_succeeded());
    assert_eq!(None, orchestrator.store().servable_holder("a"));

    service.heal_blob("a");
    let result = orchestrator.retry_failed().await.unwrap();
    assert!(result.all_succeeded());
    assert_eq!(
        Some("holder-1".to_string()),
        orchestrator.store().servable_holder("a")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holders.sqlite3");
    let service = Arc::new(LocalBlobService::new());
    service.fail_blob("b");

    {
        let store = HolderStoreHandle::load(HolderDb::open(&path).unwrap()).unwrap();
        let orchestrator = HolderOrchestrator::new(store, service.clone(), Duration::from_secs(5));
        orchestrator
            .process_holders(ProcessHoldersInput {
                holders_to_add: vec![
                    BlobHolder::new("a", "holder-1"),
                    BlobHolder::new("b", "holder-2"),
                ],
                holders_to_remove: vec![],
            })
            .await
            .unwrap();
    }

    let store = HolderStoreHandle::load(HolderDb::open(&path).unwrap()).unwrap();
    assert_eq!(Some("holder-1".to_string()), store.servable_holder("a"));
    assert_eq!(
        Some(&info("holder-2", HolderStatus::NotEstablished)),
        store.snapshot().get("b")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecorded_outcome_is_retried_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holders.sqlite3");
    let service = Arc::new(LocalBlobService::new());
    let store = HolderStoreHandle::load(HolderDb::open(&path).unwrap()).unwrap();
    let orchestrator = HolderOrchestrator::new(store, service.clone(), Duration::from_secs(5));

    // The pending stamp lands, recording the outcome does not.
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER no_established BEFORE INSERT ON holders
             WHEN NEW.status = 'ESTABLISHED'
             BEGIN SELECT RAISE(ABORT, 'read only'); END;",
        )
        .unwrap();

    let err = orchestrator
        .process_holders(ProcessHoldersInput {
            holders_to_add: vec![BlobHolder::new("a", "holder-1")],
            holders_to_remove: vec![],
        })
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Unrecorded { result, .. } => {
            assert_eq!(vec![BlobHolder::new("a", "holder-1")], result.added);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        Some(&info("holder-1", HolderStatus::PendingEstablishment)),
        orchestrator.store().snapshot().get("a")
    );

    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TRIGGER no_established;")
        .unwrap();

    let store = HolderStoreHandle::load(HolderDb::open(&path).unwrap()).unwrap();
    assert_eq!(
        Some(&info("holder-1", HolderStatus::NotEstablished)),
        store.snapshot().get("a")
    );
    let orchestrator = HolderOrchestrator::new(store, service.clone(), Duration::from_secs(5));
    let result = orchestrator.retry_failed().await.unwrap();
    assert_eq!(vec![BlobHolder::new("a", "holder-1")], result.added);
    assert_eq!(
        Some("holder-1".to_string()),
        orchestrator.store().servable_holder("a")
    );
    assert_eq!(vec!["holder-1"], service.holders("a"));
}
