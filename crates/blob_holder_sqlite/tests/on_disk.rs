use blob_holder_sqlite::HolderDb;
use blob_holder_types::prelude::*;
use blob_holder_types::test_utils::record;
use pretty_assertions::assert_eq;

#[test]
fn holders_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("holders.sqlite3");

    let before = {
        let db = HolderDb::open(&path).unwrap();
        let (store, ops) = reduce_holder_store(
            &StoredHolders::new(),
            &HolderAction::ProcessHoldersStarted(ProcessHoldersInput {
                holders_to_add: vec![BlobHolder::new("a", "h1"), BlobHolder::new("b", "h2")],
                holders_to_remove: vec![],
            }),
        );
        db.process_db_ops(&convert_ops_to_client_db_ops(Some(ops.as_slice())))
            .unwrap();
        let (store, ops) = reduce_holder_store(
            &store,
            &HolderAction::ProcessHoldersSuccess(ProcessHoldersResult {
                added: vec![BlobHolder::new("a", "h1")],
                not_added: vec![BlobHolder::new("b", "h2")],
                ..Default::default()
            }),
        );
        db.process_db_ops(&convert_ops_to_client_db_ops(Some(ops.as_slice())))
            .unwrap();
        store
    };

    let db = HolderDb::open(&path).unwrap();
    let after = db.load_stored_holders().unwrap();
    assert_eq!(before, after);
    assert_eq!(
        vec![
            record("a", "h1", HolderStatus::Established),
            record("b", "h2", HolderStatus::NotEstablished),
        ],
        after.records().collect::<Vec<_>>()
    );
}
