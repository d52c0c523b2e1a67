//! The holders database.

use crate::error::{DatabaseError, DatabaseResult};
use crate::schema::SCHEMA_HOLDERS;
use crate::sql::sql_holders;
use blob_holder_types::prelude::*;
use parking_lot::Mutex;
use rusqlite::{named_params, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A handle to the persisted holders table.
///
/// Cloning is cheap; all clones share one connection.
#[derive(Clone)]
pub struct HolderDb {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for HolderDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolderDb").field("path", &self.path).finish()
    }
}

impl HolderDb {
    /// Open (creating if needed) the database at `path`, and bring its schema
    /// up to date.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::DirectoryError(parent.to_path_buf(), e))?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::new(conn, Some(path))
    }

    /// An empty database which lives only as long as this handle.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        Self::new(Connection::open_in_memory()?, None)
    }

    fn new(mut conn: Connection, path: Option<PathBuf>) -> DatabaseResult<Self> {
        let name = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<in memory>".to_string());
        SCHEMA_HOLDERS.initialize(&mut conn, &name)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Where this database lives on disk, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a batch of operations in a single exclusive transaction.
    ///
    /// Either every operation lands or none does.
    #[tracing::instrument(skip_all, fields(ops = ops.len()))]
    pub fn process_db_ops(&self, ops: &[ClientDBHolderStoreOperation]) -> DatabaseResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let txn = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
        for op in ops {
            apply_op(&txn, op)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Every persisted row, sorted by hash.
    pub fn get_all_holders(&self) -> DatabaseResult<Vec<ClientDBHolderItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql_holders::SELECT_ALL)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ClientDBHolderItem {
                    hash: row.get(0)?,
                    holder: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rebuild the holder store from disk.
    ///
    /// Fails if any row carries a status which is not recognized.
    pub fn load_stored_holders(&self) -> DatabaseResult<StoredHolders> {
        let rows = self.get_all_holders()?;
        let store = translate_client_db_data(&rows)?;
        tracing::debug!(holders = store.len(), "loaded stored holders");
        Ok(store)
    }

    /// Every record with the given status, sorted by hash.
    pub fn holders_with_status(&self, status: HolderStatus) -> DatabaseResult<Vec<HolderRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql_holders::SELECT_BY_STATUS)?;
        let records = stmt
            .query_map(named_params! { ":status": status }, |row| {
                Ok(HolderRecord {
                    blob_hash: row.get(0)?,
                    holder: row.get(1)?,
                    status: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// How many records carry each status. Statuses with no records are absent.
    pub fn status_counts(&self) -> DatabaseResult<BTreeMap<HolderStatus, usize>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql_holders::COUNT_BY_STATUS)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(counts)
    }
}

fn apply_op(txn: &Transaction, op: &ClientDBHolderStoreOperation) -> DatabaseResult<()> {
    match op {
        ClientDBHolderStoreOperation::ReplaceHolders { items } => {
            let mut stmt = txn.prepare_cached(sql_holders::REPLACE)?;
            for item in items {
                stmt.execute(named_params! {
                    ":hash": item.hash,
                    ":holder": item.holder,
                    ":status": item.status,
                })?;
            }
        }
        ClientDBHolderStoreOperation::RemoveHolders { hashes } => {
            let mut stmt = txn.prepare_cached(sql_holders::DELETE)?;
            for hash in hashes {
                stmt.execute(named_params! { ":hash": hash })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_holder_types::test_utils::*;
    use pretty_assertions::assert_eq;

    fn replace(items: Vec<ClientDBHolderItem>) -> ClientDBHolderStoreOperation {
        ClientDBHolderStoreOperation::ReplaceHolders { items }
    }

    fn remove(hashes: &[&str]) -> ClientDBHolderStoreOperation {
        ClientDBHolderStoreOperation::RemoveHolders {
            hashes: hashes.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn replace_and_remove() {
        let db = HolderDb::open_in_memory().unwrap();
        db.process_db_ops(&[replace(vec![
            row("b", "h2", "PENDING_REMOVAL"),
            row("a", "h1", "ESTABLISHED"),
        ])])
        .unwrap();
        assert_eq!(
            vec![
                row("a", "h1", "ESTABLISHED"),
                row("b", "h2", "PENDING_REMOVAL")
            ],
            db.get_all_holders().unwrap()
        );

        db.process_db_ops(&[
            remove(&["b", "unknown"]),
            replace(vec![row("a", "h3", "NOT_ESTABLISHED")]),
        ])
        .unwrap();
        assert_eq!(
            vec![row("a", "h3", "NOT_ESTABLISHED")],
            db.get_all_holders().unwrap()
        );
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let db = HolderDb::open_in_memory().unwrap();
        db.process_db_ops(&[replace(vec![row("a", "h1", "ESTABLISHED")])])
            .unwrap();
        {
            let conn = db.conn.lock();
            conn.execute_batch(
                "CREATE TRIGGER no_c BEFORE INSERT ON holders WHEN NEW.hash = 'c'
                 BEGIN SELECT RAISE(ABORT, 'no c'); END;",
            )
            .unwrap();
        }
        assert!(db
            .process_db_ops(&[
                remove(&["a"]),
                replace(vec![row("b", "h2", "ESTABLISHED"), row("c", "h3", "ESTABLISHED")]),
            ])
            .is_err());
        assert_eq!(
            vec![row("a", "h1", "ESTABLISHED")],
            db.get_all_holders().unwrap()
        );
    }

    #[test]
    fn corrupt_status_fails_load() {
        let db = HolderDb::open_in_memory().unwrap();
        db.process_db_ops(&[replace(vec![
            row("a", "h1", "ESTABLISHED"),
            row("b", "h2", "HALF_ESTABLISHED"),
        ])])
        .unwrap();
        assert!(matches!(
            db.load_stored_holders(),
            Err(DatabaseError::Corrupt(HolderError::InvalidStatus(s))) if s == "HALF_ESTABLISHED"
        ));
    }

    #[test]
    fn query_by_status() {
        let db = HolderDb::open_in_memory().unwrap();
        db.process_db_ops(&[replace(vec![
            row("a", "h1", "ESTABLISHED"),
            row("b", "h2", "NOT_REMOVED"),
            row("c", "h3", "ESTABLISHED"),
        ])])
        .unwrap();
        assert_eq!(
            vec![
                record("a", "h1", HolderStatus::Established),
                record("c", "h3", HolderStatus::Established),
            ],
            db.holders_with_status(HolderStatus::Established).unwrap()
        );
        assert_eq!(
            counts(&[(HolderStatus::Established, 2), (HolderStatus::NotRemoved, 1)]),
            db.status_counts().unwrap()
        );
    }

    fn counts(pairs: &[(HolderStatus, usize)]) -> BTreeMap<HolderStatus, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn store_round_trips_through_sqlite() {
        let store: StoredHolders = [
            record("a", "h1", HolderStatus::PendingEstablishment),
            record("b", "h2", HolderStatus::Established),
            record("c", "h3", HolderStatus::NotRemoved),
        ]
        .into_iter()
        .collect();
        let db = HolderDb::open_in_memory().unwrap();
        db.process_db_ops(&[replace(store.to_client_db_rows())])
            .unwrap();
        assert_eq!(store, db.load_stored_holders().unwrap());
    }
}
