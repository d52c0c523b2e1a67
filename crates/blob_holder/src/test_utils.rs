//! In-process stand-ins for the collaborators of the holder service.

use crate::blob_service::{BlobExistence, BlobService};
use crate::cache::PersistentMediaCache;
use crate::error::{
    BlobServiceError, BlobServiceResult, ResourceStoreError, ResourceStoreResult,
};
use crate::sweeper::{HeldResource, ResourceStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct LocalBlobServiceState {
    blobs: HashSet<String>,
    holders: HashMap<String, HashSet<String>>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
}

/// A blob service living in memory, with fault injection per blob hash.
#[derive(Default)]
pub struct LocalBlobService {
    state: Mutex<LocalBlobServiceState>,
    calls: AtomicUsize,
}

impl LocalBlobService {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the blob exist.
    pub fn add_blob(&self, blob_hash: &str) {
        self.state.lock().blobs.insert(blob_hash.to_string());
    }

    /// Make the blob disappear, together with its holders.
    pub fn drop_blob(&self, blob_hash: &str) {
        let mut state = self.state.lock();
        state.blobs.remove(blob_hash);
        state.holders.remove(blob_hash);
    }

    /// Every call touching the blob fails with a server error.
    pub fn fail_blob(&self, blob_hash: &str) {
        self.state.lock().failing.insert(blob_hash.to_string());
    }

    /// Every call touching the blob never resolves.
    pub fn hang_blob(&self, blob_hash: &str) {
        self.state.lock().hanging.insert(blob_hash.to_string());
    }

    /// Undo any injected fault for the blob.
    pub fn heal_blob(&self, blob_hash: &str) {
        let mut state = self.state.lock();
        state.failing.remove(blob_hash);
        state.hanging.remove(blob_hash);
    }

    /// The holders registered against a blob, sorted
    pub fn holders(&self, blob_hash: &str) -> Vec<String> {
        let mut holders: Vec<_> = self
            .state
            .lock()
            .holders
            .get(blob_hash)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// How many calls were made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, blob_hash: &str) -> BlobServiceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (failing, hanging) = {
            let state = self.state.lock();
            (
                state.failing.contains(blob_hash),
                state.hanging.contains(blob_hash),
            )
        };
        if hanging {
            futures::future::pending::<()>().await;
        }
        if failing {
            return Err(BlobServiceError::ServerError);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobService for LocalBlobService {
    async fn establish_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()> {
        self.enter(blob_hash).await?;
        self.state
            .lock()
            .holders
            .entry(blob_hash.to_string())
            .or_default()
            .insert(holder.to_string());
        Ok(())
    }

    async fn remove_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()> {
        self.enter(blob_hash).await?;
        if let Some(holders) = self.state.lock().holders.get_mut(blob_hash) {
            holders.remove(holder);
        }
        Ok(())
    }

    async fn blob_exists(&self, blob_hash: &str) -> BlobServiceResult<BlobExistence> {
        self.enter(blob_hash).await?;
        Ok(if self.state.lock().blobs.contains(blob_hash) {
            BlobExistence::Found
        } else {
            BlobExistence::NotFound
        })
    }
}

/// A resource store living in memory.
#[derive(Default)]
pub struct MemoryResourceStore {
    resources: Mutex<BTreeMap<String, HeldResource>>,
    failing: Mutex<HashSet<String>>,
    writes: AtomicUsize,
}

impl MemoryResourceStore {
    /// Constructor
    pub fn new(resources: impl IntoIterator<Item = HeldResource>) -> Self {
        Self {
            resources: Mutex::new(
                resources
                    .into_iter()
                    .map(|r| (r.resource_id.clone(), r))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Look up a resource
    pub fn get(&self, resource_id: &str) -> Option<HeldResource> {
        self.resources.lock().get(resource_id).cloned()
    }

    /// Persisting a holder on this resource fails.
    pub fn fail_resource(&self, resource_id: &str) {
        self.failing.lock().insert(resource_id.to_string());
    }

    /// How many holder tokens were persisted
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn list_resources_needing_holder(&self) -> ResourceStoreResult<Vec<HeldResource>> {
        Ok(self.resources.lock().values().cloned().collect())
    }

    async fn persist_holder_token(
        &self,
        resource_id: &str,
        holder: &str,
    ) -> ResourceStoreResult<()> {
        if self.failing.lock().contains(resource_id) {
            return Err(anyhow::anyhow!("write to {resource_id} refused").into());
        }
        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| ResourceStoreError::UnknownResource(resource_id.to_string()))?;
        resource.holder = Some(holder.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A media cache writing files below a directory, evicting oldest first.
pub struct DirMediaCache {
    root: PathBuf,
    // (uri, path, size) in insertion order
    files: Mutex<Vec<(String, PathBuf, u64)>>,
}

impl DirMediaCache {
    /// Constructor
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(Vec::new()),
        }
    }

    fn lookup(&self, uri: &str) -> Option<PathBuf> {
        self.files
            .lock()
            .iter()
            .find(|(u, _, _)| u == uri)
            .map(|(_, p, _)| p.clone())
    }
}

#[async_trait::async_trait]
impl PersistentMediaCache for DirMediaCache {
    async fn has_uri(&self, uri: &str) -> bool {
        self.lookup(uri).is_some()
    }

    async fn get_cached_file(&self, uri: &str) -> Option<PathBuf> {
        self.lookup(uri)
    }

    async fn save_file(&self, uri: &str, data: Vec<u8>) -> std::io::Result<PathBuf> {
        if let Some(path) = self.lookup(uri) {
            return Ok(path);
        }
        let path = self
            .root
            .join(blob_holder_types::generate_blob_holder(None));
        let size = data.len() as u64;
        tokio::fs::write(&path, data).await?;
        self.files.lock().push((uri.to_string(), path.clone(), size));
        Ok(path)
    }

    async fn cleanup_old_files(&self, size_limit: u64) -> std::io::Result<bool> {
        let evicted = {
            let mut files = self.files.lock();
            let mut total: u64 = files.iter().map(|(_, _, s)| s).sum();
            let mut evicted = Vec::new();
            while total > size_limit && !files.is_empty() {
                let (_, path, size) = files.remove(0);
                total -= size;
                evicted.push(path);
            }
            evicted
        };
        for path in &evicted {
            tokio::fs::remove_file(path).await?;
        }
        Ok(!evicted.is_empty())
    }
}
