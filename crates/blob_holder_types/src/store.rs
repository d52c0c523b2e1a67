//! The holder store: an immutable map from blob hash to holder.

use crate::ops::{ClientDBHolderItem, HolderStoreOperation};
use crate::record::{HolderInfo, HolderRecord};
use crate::status::HolderStatus;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All holders known to one local store, keyed by blob hash.
///
/// The map is shared and never mutated in place. Applying operations produces
/// a new `StoredHolders`, except when there is nothing to apply, in which case
/// the very same map is handed back (see [`StoredHolders::ptr_eq`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StoredHolders(Arc<BTreeMap<String, HolderInfo>>);

impl StoredHolders {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing map.
    pub fn from_map(map: BTreeMap<String, HolderInfo>) -> Self {
        Self(Arc::new(map))
    }

    /// Whether both stores share the same underlying map.
    /// Used for cheap change detection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Look up the holder for a blob.
    pub fn get(&self, blob_hash: &str) -> Option<&HolderInfo> {
        self.0.get(blob_hash)
    }

    /// Whether this store knows of a holder for the blob.
    pub fn contains(&self, blob_hash: &str) -> bool {
        self.0.contains_key(blob_hash)
    }

    /// Number of known holders
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no holders are known
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(blob_hash, holder)` pairs in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HolderInfo)> {
        self.0.iter()
    }

    /// All records in hash order.
    pub fn records(&self) -> impl Iterator<Item = HolderRecord> + '_ {
        self.0.iter().map(|(hash, info)| HolderRecord {
            blob_hash: hash.clone(),
            holder: info.holder.clone(),
            status: info.status,
        })
    }

    /// All records with the given status.
    pub fn with_status(&self, status: HolderStatus) -> impl Iterator<Item = HolderRecord> + '_ {
        self.records().filter(move |r| r.status == status)
    }

    /// The holder token for a blob, if its holder is established.
    pub fn established_holder(&self, blob_hash: &str) -> Option<&str> {
        self.get(blob_hash)
            .filter(|info| info.status == HolderStatus::Established)
            .map(|info| info.holder.as_str())
    }

    /// Flatten into rows of the persisted holders table, sorted by hash.
    pub fn to_client_db_rows(&self) -> Vec<ClientDBHolderItem> {
        self.0
            .iter()
            .map(|(hash, info)| ClientDBHolderItem {
                hash: hash.clone(),
                holder: info.holder.clone(),
                status: info.status.as_str().to_string(),
            })
            .collect()
    }
}

impl FromIterator<HolderRecord> for StoredHolders {
    fn from_iter<T: IntoIterator<Item = HolderRecord>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().map(HolderRecord::into_parts).collect())
    }
}

/// Apply a batch of operations to the store.
///
/// Operations are applied in order, so a later operation touching the same
/// hash wins over an earlier one. Applying an empty batch returns the same
/// store, not a copy.
pub fn process_store_operations(
    store: &StoredHolders,
    ops: &[HolderStoreOperation],
) -> StoredHolders {
    if ops.is_empty() {
        return store.clone();
    }

    let mut holders = (*store.0).clone();
    for op in ops {
        match op {
            HolderStoreOperation::ReplaceHolders { items } => {
                for item in items {
                    holders.insert(
                        item.hash.clone(),
                        HolderInfo {
                            holder: item.holder.clone(),
                            status: item.status,
                        },
                    );
                }
            }
            HolderStoreOperation::RemoveHolders { hashes } => {
                for hash in hashes {
                    holders.remove(hash);
                }
            }
        }
    }

    StoredHolders::from_map(holders)
}

/// Holders which were alive in `old` but are not alive, under the same token,
/// in `new`.
///
/// A holder leaves the alive set when its record is removed, when its status
/// moves out of [`HolderStatus::is_alive`], or when its hash gets a different
/// holder token. Anything cached under such a holder must be dropped.
pub fn holders_leaving_alive_set(old: &StoredHolders, new: &StoredHolders) -> Vec<String> {
    if old.ptr_eq(new) {
        return Vec::new();
    }
    old.iter()
        .filter(|(_, info)| info.status.is_alive())
        .filter(|(hash, info)| match new.get(hash) {
            Some(next) => next.holder != info.holder || !next.status.is_alive(),
            None => true,
        })
        .map(|(_, info)| info.holder.clone())
        .collect()
}
