//! The single owner of the local holder store.

use crate::cache::HolderUriCache;
use blob_holder_sqlite::{DatabaseResult, HolderDb};
use blob_holder_types::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to the holder store and its persisted mirror.
///
/// Every change goes through [`HolderStoreHandle::dispatch`]. Dispatches are
/// serialized; the database is written before the in-memory store is swapped,
/// so a failed write leaves both untouched.
#[derive(Clone)]
pub struct HolderStoreHandle {
    store: Arc<Mutex<StoredHolders>>,
    db: HolderDb,
    caches: Vec<Arc<dyn HolderUriCache>>,
}

impl std::fmt::Debug for HolderStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolderStoreHandle")
            .field("holders", &self.store.lock().len())
            .field("db", &self.db)
            .finish()
    }
}

impl HolderStoreHandle {
    /// Load the store from the database.
    ///
    /// Holders still pending on disk belong to a run which never recorded
    /// its outcome. They are settled to the matching failed status, both on
    /// disk and in memory, so [`retry_failed_holders`] picks them up.
    pub fn load(db: HolderDb) -> DatabaseResult<Self> {
        let loaded = db.load_stored_holders()?;
        let ops = settle_interrupted_holders(&loaded);
        if !ops.is_empty() {
            db.process_db_ops(&convert_ops_to_client_db_ops(Some(ops.as_slice())))?;
            tracing::warn!(?ops, "settled holders left pending by an interrupted run");
        }
        let store = process_store_operations(&loaded, &ops);
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            db,
            caches: Vec::new(),
        })
    }

    /// Invalidate entries of this cache whenever a holder stops being alive.
    pub fn with_cache(mut self, cache: Arc<dyn HolderUriCache>) -> Self {
        self.caches.push(cache);
        self
    }

    /// The current store
    pub fn snapshot(&self) -> StoredHolders {
        self.store.lock().clone()
    }

    /// The persisted mirror
    pub fn db(&self) -> &HolderDb {
        &self.db
    }

    /// Reduce an action into the store, persisting the resulting operations.
    ///
    /// Returns the new store.
    pub fn dispatch(&self, action: &HolderAction) -> DatabaseResult<StoredHolders> {
        let (next, leaving) = {
            let mut current = self.store.lock();
            let (next, ops) = reduce_holder_store(&current, action);
            if next.ptr_eq(&current) {
                return Ok(next);
            }
            self.db
                .process_db_ops(&convert_ops_to_client_db_ops(Some(ops.as_slice())))?;
            let leaving = holders_leaving_alive_set(&current, &next);
            *current = next.clone();
            (next, leaving)
        };

        for holder in &leaving {
            for cache in &self.caches {
                cache.invalidate(holder);
            }
        }
        if !leaving.is_empty() {
            tracing::debug!(count = leaving.len(), "holders left the alive set");
        }
        Ok(next)
    }

    /// The holder under which the blob may be served, if any.
    ///
    /// Only an `ESTABLISHED` holder is servable. A pending holder may still be
    /// rejected by the blob service.
    pub fn servable_holder(&self, blob_hash: &str) -> Option<String> {
        self.store
            .lock()
            .established_holder(blob_hash)
            .map(str::to_string)
    }
}
