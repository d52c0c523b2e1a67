//! Consumer caches which hold data fetched under a holder.
//!
//! The holder store calls [`HolderUriCache::invalidate`] for every holder
//! which stops being alive, so nothing is served under a holder the blob
//! service may already have forgotten.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

/// Maps holders to the URI their blob was materialized at.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
pub trait HolderUriCache: Send + Sync {
    /// The cached URI for a holder
    fn get(&self, holder: &str) -> Option<String>;

    /// Cache a URI for a holder, returning the URI which is now committed.
    /// If a URI was already cached for the holder, it is kept and returned.
    fn set(&self, holder: &str, uri: String) -> String;

    /// Forget whatever is cached for the holder.
    fn invalidate(&self, holder: &str);
}

/// On-disk media cache, keyed by blob URI.
#[async_trait::async_trait]
pub trait PersistentMediaCache: Send + Sync {
    /// Whether the URI has a cached file
    async fn has_uri(&self, uri: &str) -> bool;

    /// The cached file for a URI
    async fn get_cached_file(&self, uri: &str) -> Option<PathBuf>;

    /// Store the bytes of a URI, returning where they were written.
    async fn save_file(&self, uri: &str, data: Vec<u8>) -> std::io::Result<PathBuf>;

    /// Evict the oldest files until the cache holds at most `size_limit` bytes.
    /// Returns whether anything was evicted.
    async fn cleanup_old_files(&self, size_limit: u64) -> std::io::Result<bool>;
}

/// A [`HolderUriCache`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryHolderUriCache(Mutex<HashMap<String, String>>);

impl MemoryHolderUriCache {
    /// Number of cached holders
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl HolderUriCache for MemoryHolderUriCache {
    fn get(&self, holder: &str) -> Option<String> {
        self.0.lock().get(holder).cloned()
    }

    fn set(&self, holder: &str, uri: String) -> String {
        self.0
            .lock()
            .entry(holder.to_string())
            .or_insert(uri)
            .clone()
    }

    fn invalidate(&self, holder: &str) {
        if self.0.lock().remove(holder).is_some() {
            tracing::trace!(%holder, "invalidated cached uri");
        }
    }
}
