//! Holder records.

use crate::status::HolderStatus;

/// A holder token registered (or to be registered) against a blob.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
#[display(fmt = "{}/{}", blob_hash, holder)]
#[serde(rename_all = "camelCase")]
pub struct BlobHolder {
    /// Hash of the blob in the blob service
    pub blob_hash: String,
    /// The holder token
    pub holder: String,
}

impl BlobHolder {
    /// Constructor
    pub fn new(blob_hash: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            blob_hash: blob_hash.into(),
            holder: holder.into(),
        }
    }

    /// Attach a status, producing a full record.
    pub fn with_status(self, status: HolderStatus) -> HolderRecord {
        HolderRecord {
            blob_hash: self.blob_hash,
            holder: self.holder,
            status,
        }
    }
}

/// The value stored per blob hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HolderInfo {
    /// The holder token
    pub holder: String,
    /// Current status of the holder
    pub status: HolderStatus,
}

/// A holder together with the hash it is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderRecord {
    /// Hash of the blob in the blob service
    pub blob_hash: String,
    /// The holder token
    pub holder: String,
    /// Current status of the holder
    pub status: HolderStatus,
}

impl HolderRecord {
    /// Split into the key and the stored value.
    pub fn into_parts(self) -> (String, HolderInfo) {
        (
            self.blob_hash,
            HolderInfo {
                holder: self.holder,
                status: self.status,
            },
        )
    }

    /// Drop the status.
    pub fn blob_holder(&self) -> BlobHolder {
        BlobHolder::new(self.blob_hash.clone(), self.holder.clone())
    }
}
