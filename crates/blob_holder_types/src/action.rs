//! Lifecycle events of a `process_holders` run and the reducer which turns
//! them into holder store operations.
//!
//! | event     | store operations                                                |
//! |-----------|-----------------------------------------------------------------|
//! | `started` | `replace_holders`: adds `PENDING_ESTABLISHMENT`, removes `PENDING_REMOVAL` |
//! | `success` | `replace_holders`: `ESTABLISHED`, `NOT_ESTABLISHED`, `NOT_REMOVED`; `remove_holders`: removed |
//! | `failed`  | none                                                            |

use crate::error::{HolderError, HolderResult};
use crate::ops::HolderStoreOperation;
use crate::record::BlobHolder;
use crate::status::HolderStatus;
use crate::store::{process_store_operations, StoredHolders};
use crate::token::{validate_blob_hash, validate_holder};
use std::collections::HashSet;

/// What a caller wants done with holders.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHoldersInput {
    /// Holders to establish
    pub holders_to_add: Vec<BlobHolder>,
    /// Holders to remove
    pub holders_to_remove: Vec<BlobHolder>,
}

impl ProcessHoldersInput {
    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.holders_to_add.is_empty() && self.holders_to_remove.is_empty()
    }

    /// Check every item before anything is stamped or sent.
    ///
    /// Each hash and holder must be well formed, and a hash may appear only
    /// once across both lists.
    pub fn validate(&self) -> HolderResult<()> {
        let mut seen = HashSet::new();
        for item in self.holders_to_add.iter().chain(&self.holders_to_remove) {
            validate_blob_hash(&item.blob_hash)?;
            validate_holder(&item.holder)?;
            if !seen.insert(item.blob_hash.as_str()) {
                return Err(HolderError::DuplicateBlobHash(item.blob_hash.clone()));
            }
        }
        Ok(())
    }
}

/// Build an input which retries every holder whose last remote call failed.
///
/// `NOT_ESTABLISHED` holders are established again, `NOT_REMOVED` holders
/// are removed again. Everything else is left alone.
pub fn retry_failed_holders(store: &StoredHolders) -> ProcessHoldersInput {
    let mut input = ProcessHoldersInput::default();
    for record in store.records().filter(|r| r.status.needs_retry()) {
        match record.status {
            HolderStatus::NotEstablished => input.holders_to_add.push(record.blob_holder()),
            _ => input.holders_to_remove.push(record.blob_holder()),
        }
    }
    input
}

/// Operations which settle holders left pending by a run that never
/// recorded its outcome.
///
/// `PENDING_ESTABLISHMENT` becomes `NOT_ESTABLISHED` and `PENDING_REMOVAL`
/// becomes `NOT_REMOVED`, which makes them eligible for
/// [`retry_failed_holders`]. Only meaningful while no run is in flight.
pub fn settle_interrupted_holders(store: &StoredHolders) -> Vec<HolderStoreOperation> {
    let settled: Vec<_> = store
        .records()
        .filter_map(|mut record| {
            record.status = match record.status {
                HolderStatus::PendingEstablishment => HolderStatus::NotEstablished,
                HolderStatus::PendingRemoval => HolderStatus::NotRemoved,
                _ => return None,
            };
            Some(record)
        })
        .collect();
    if settled.is_empty() {
        return Vec::new();
    }
    vec![HolderStoreOperation::replace(settled)]
}

/// Per-item outcome of a `process_holders` run.
///
/// Every input item lands in exactly one of the four buckets.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHoldersResult {
    /// Holders the blob service confirmed
    pub added: Vec<BlobHolder>,
    /// Holders the blob service removed
    pub removed: Vec<BlobHolder>,
    /// Holders which could not be established
    pub not_added: Vec<BlobHolder>,
    /// Holders which could not be removed
    pub not_removed: Vec<BlobHolder>,
}

impl ProcessHoldersResult {
    /// Whether every item succeeded
    pub fn all_succeeded(&self) -> bool {
        self.not_added.is_empty() && self.not_removed.is_empty()
    }

    /// Total number of classified items
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.not_added.len() + self.not_removed.len()
    }

    /// Whether no items were classified
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three observable events of a `process_holders` run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HolderAction {
    /// The run is about to issue its remote calls.
    ProcessHoldersStarted(ProcessHoldersInput),
    /// All remote calls have resolved.
    ProcessHoldersSuccess(ProcessHoldersResult),
    /// The run was aborted before any remote call was made.
    ProcessHoldersFailed {
        /// Why
        error: String,
    },
}

/// Compute the store operations an action implies.
pub fn holder_store_ops_for_action(action: &HolderAction) -> Vec<HolderStoreOperation> {
    let mut ops = Vec::new();
    match action {
        HolderAction::ProcessHoldersStarted(ProcessHoldersInput {
            holders_to_add,
            holders_to_remove,
        }) => {
            let items = stamp(holders_to_add, HolderStatus::PendingEstablishment)
                .chain(stamp(holders_to_remove, HolderStatus::PendingRemoval));
            ops.push(HolderStoreOperation::replace(items));
        }
        HolderAction::ProcessHoldersSuccess(ProcessHoldersResult {
            added,
            removed,
            not_added,
            not_removed,
        }) => {
            let items = stamp(added, HolderStatus::Established)
                .chain(stamp(not_added, HolderStatus::NotEstablished))
                .chain(stamp(not_removed, HolderStatus::NotRemoved));
            ops.push(HolderStoreOperation::replace(items));
            ops.push(HolderStoreOperation::remove(
                removed.iter().map(|h| h.blob_hash.clone()),
            ));
        }
        HolderAction::ProcessHoldersFailed { error } => {
            tracing::warn!(?error, "process holders failed");
        }
    }
    ops.retain(|op| !op.is_empty());
    ops
}

/// Apply an action to the store, returning the new store and the operations
/// which were applied, so the same operations can be persisted.
pub fn reduce_holder_store(
    store: &StoredHolders,
    action: &HolderAction,
) -> (StoredHolders, Vec<HolderStoreOperation>) {
    let ops = holder_store_ops_for_action(action);
    (process_store_operations(store, &ops), ops)
}

fn stamp(
    holders: &[BlobHolder],
    status: HolderStatus,
) -> impl Iterator<Item = crate::record::HolderRecord> + '_ {
    holders.iter().map(move |h| h.clone().with_status(status))
}
