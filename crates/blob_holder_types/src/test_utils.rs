//! Helpers for building holder data in tests.

use crate::ops::{ClientDBHolderItem, HolderStoreOperation, ReplaceHolderItem};
use crate::record::{HolderInfo, HolderRecord};
use crate::status::HolderStatus;
use crate::store::StoredHolders;
use proptest::prelude::*;

/// Build a record
pub fn record(hash: &str, holder: &str, status: HolderStatus) -> HolderRecord {
    HolderRecord {
        blob_hash: hash.to_string(),
        holder: holder.to_string(),
        status,
    }
}

/// Build a stored value
pub fn info(holder: &str, status: HolderStatus) -> HolderInfo {
    HolderInfo {
        holder: holder.to_string(),
        status,
    }
}

/// Build a persisted row
pub fn row(hash: &str, holder: &str, status: &str) -> ClientDBHolderItem {
    ClientDBHolderItem {
        hash: hash.to_string(),
        holder: holder.to_string(),
        status: status.to_string(),
    }
}

/// Any status
pub fn arb_status() -> impl Strategy<Value = HolderStatus> {
    proptest::sample::select(HolderStatus::ALL.to_vec())
}

/// A small hash alphabet, so that operations collide often.
pub fn arb_hash() -> impl Strategy<Value = String> {
    "[a-e]"
}

/// Any valid holder token
pub fn arb_holder() -> impl Strategy<Value = String> {
    "[a-z0-9]{3,8}"
}

/// Any record
pub fn arb_record() -> impl Strategy<Value = HolderRecord> {
    (arb_hash(), arb_holder(), arb_status()).prop_map(|(blob_hash, holder, status)| HolderRecord {
        blob_hash,
        holder,
        status,
    })
}

/// Any store
pub fn arb_stored_holders() -> impl Strategy<Value = StoredHolders> {
    proptest::collection::vec(arb_record(), 0..6)
        .prop_map(|records| records.into_iter().collect())
}

/// Any operation
pub fn arb_operation() -> impl Strategy<Value = HolderStoreOperation> {
    prop_oneof![
        proptest::collection::vec(arb_record(), 0..4).prop_map(|records| {
            HolderStoreOperation::ReplaceHolders {
                items: records.into_iter().map(ReplaceHolderItem::from).collect(),
            }
        }),
        proptest::collection::vec(arb_hash(), 0..4)
            .prop_map(|hashes| HolderStoreOperation::RemoveHolders { hashes }),
    ]
}
