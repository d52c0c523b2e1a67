//! The holder store operation log.
//!
//! [`HolderStoreOperation`]s are the only way to change a
//! [`StoredHolders`](crate::StoredHolders). The same operations, translated to
//! their [`ClientDBHolderStoreOperation`] shape, are applied to the persisted
//! holders table so that memory and disk never diverge.

use crate::error::HolderResult;
use crate::record::{HolderInfo, HolderRecord};
use crate::status::HolderStatus;
use crate::store::StoredHolders;
use std::collections::BTreeMap;

/// One upserted holder inside a `replace_holders` operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ReplaceHolderItem {
    /// Blob hash, the store key
    pub hash: String,
    /// The holder token
    pub holder: String,
    /// New status
    pub status: HolderStatus,
}

impl From<HolderRecord> for ReplaceHolderItem {
    fn from(r: HolderRecord) -> Self {
        Self {
            hash: r.blob_hash,
            holder: r.holder,
            status: r.status,
        }
    }
}

/// A mutation of the holder store.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HolderStoreOperation {
    /// Insert or overwrite the record for every item's hash.
    ReplaceHolders {
        /// The records to write
        items: Vec<ReplaceHolderItem>,
    },
    /// Delete the records for these hashes. Unknown hashes are ignored.
    RemoveHolders {
        /// The keys to delete
        hashes: Vec<String>,
    },
}

impl HolderStoreOperation {
    /// Build a `replace_holders` operation from records.
    pub fn replace(records: impl IntoIterator<Item = HolderRecord>) -> Self {
        HolderStoreOperation::ReplaceHolders {
            items: records.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a `remove_holders` operation.
    pub fn remove(hashes: impl IntoIterator<Item = String>) -> Self {
        HolderStoreOperation::RemoveHolders {
            hashes: hashes.into_iter().collect(),
        }
    }

    /// Whether applying this operation can change anything.
    pub fn is_empty(&self) -> bool {
        match self {
            HolderStoreOperation::ReplaceHolders { items } => items.is_empty(),
            HolderStoreOperation::RemoveHolders { hashes } => hashes.is_empty(),
        }
    }
}

/// A row of the persisted holders table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClientDBHolderItem {
    /// Primary key
    pub hash: String,
    /// The holder token
    pub holder: String,
    /// One of the [`HolderStatus`] persisted names
    pub status: String,
}

impl From<ReplaceHolderItem> for ClientDBHolderItem {
    fn from(item: ReplaceHolderItem) -> Self {
        Self {
            hash: item.hash,
            holder: item.holder,
            status: item.status.as_str().to_string(),
        }
    }
}

/// A mutation of the persisted holders table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientDBHolderStoreOperation {
    /// Upsert these rows.
    ReplaceHolders {
        /// The rows to write
        items: Vec<ClientDBHolderItem>,
    },
    /// Delete the rows with these primary keys.
    RemoveHolders {
        /// The keys to delete
        hashes: Vec<String>,
    },
}

/// Translate in-memory operations to their storage shape.
///
/// Both layers agree on the item shape, so this only renders statuses to
/// their persisted names.
pub fn convert_ops_to_client_db_ops(
    ops: Option<&[HolderStoreOperation]>,
) -> Vec<ClientDBHolderStoreOperation> {
    let Some(ops) = ops else {
        return Vec::new();
    };
    ops.iter()
        .cloned()
        .map(|op| match op {
            HolderStoreOperation::ReplaceHolders { items } => {
                ClientDBHolderStoreOperation::ReplaceHolders {
                    items: items.into_iter().map(Into::into).collect(),
                }
            }
            HolderStoreOperation::RemoveHolders { hashes } => {
                ClientDBHolderStoreOperation::RemoveHolders { hashes }
            }
        })
        .collect()
}

/// Rebuild the store from the persisted rows.
///
/// Every status is validated. A single unrecognized status fails the whole
/// load: guessing could either leak a holder forever or pretend a blob is
/// protected when it is not.
pub fn translate_client_db_data(rows: &[ClientDBHolderItem]) -> HolderResult<StoredHolders> {
    let mut holders = BTreeMap::new();
    for row in rows {
        let status = match HolderStatus::parse(&row.status) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(hash = %row.hash, status = %row.status, "corrupt holder row");
                return Err(e);
            }
        };
        holders.insert(
            row.hash.clone(),
            HolderInfo {
                holder: row.holder.clone(),
                status,
            },
        );
    }
    Ok(StoredHolders::from_map(holders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HolderError;
    use crate::test_utils::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_ops_convert_to_nothing() {
        assert!(convert_ops_to_client_db_ops(None).is_empty());
        assert!(convert_ops_to_client_db_ops(Some(&[][..])).is_empty());
    }

    #[test]
    fn conversion_keeps_shape() {
        let ops = vec![
            HolderStoreOperation::replace([
                record("foo", "bar", HolderStatus::Established),
                record("baz", "qux", HolderStatus::PendingRemoval),
            ]),
            HolderStoreOperation::remove(["foo".to_string()]),
        ];
        let expected = vec![
            ClientDBHolderStoreOperation::ReplaceHolders {
                items: vec![
                    row("foo", "bar", "ESTABLISHED"),
                    row("baz", "qux", "PENDING_REMOVAL"),
                ],
            },
            ClientDBHolderStoreOperation::RemoveHolders {
                hashes: vec!["foo".to_string()],
            },
        ];
        assert_eq!(expected, convert_ops_to_client_db_ops(Some(ops.as_slice())));
    }

    #[test]
    fn operation_json_shape() {
        let op = HolderStoreOperation::replace([record("foo", "bar", HolderStatus::Established)]);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            serde_json::json!({
                "type": "replace_holders",
                "payload": {
                    "items": [{ "hash": "foo", "holder": "bar", "status": "ESTABLISHED" }]
                }
            }),
            json
        );

        let op = HolderStoreOperation::remove(["foo".to_string()]);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            serde_json::json!({ "type": "remove_holders", "payload": { "hashes": ["foo"] } }),
            json
        );
    }

    #[test]
    fn translate_rebuilds_store() {
        let rows = vec![
            row("a", "h1", "ESTABLISHED"),
            row("b", "h2", "NOT_REMOVED"),
        ];
        let store = translate_client_db_data(&rows).unwrap();
        assert_eq!(2, store.len());
        assert_eq!(
            Some(&HolderInfo {
                holder: "h2".into(),
                status: HolderStatus::NotRemoved
            }),
            store.get("b")
        );
    }

    #[test]
    fn translate_rejects_corrupt_status() {
        let rows = vec![
            row("a", "h1", "ESTABLISHED"),
            row("b", "h2", "MAYBE_ESTABLISHED"),
        ];
        assert_eq!(
            Err(HolderError::InvalidStatus("MAYBE_ESTABLISHED".into())),
            translate_client_db_data(&rows)
        );
    }

    #[test]
    fn translate_empty() {
        assert!(translate_client_db_data(&[]).unwrap().is_empty());
    }
}
