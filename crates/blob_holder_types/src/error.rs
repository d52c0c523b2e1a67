//! Errors for holder types.

/// Errors which can occur while parsing or validating holder data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HolderError {
    /// A persisted status string is not one of the known statuses.
    /// This means the persisted data is corrupt.
    #[error("Unrecognized holder status: {0:?}")]
    InvalidStatus(String),

    /// The holder token cannot be registered with the blob service.
    #[error("Invalid holder: {0:?}")]
    InvalidHolder(String),

    /// The blob hash cannot be used to address a blob.
    #[error("Invalid blob hash: {0:?}")]
    InvalidBlobHash(String),

    /// A single batch mentions the same blob hash more than once.
    /// The store is keyed by hash, so the outcome would be ambiguous.
    #[error("Blob hash appears more than once in one batch: {0:?}")]
    DuplicateBlobHash(String),
}

/// Alias
pub type HolderResult<T> = Result<T, HolderError>;
