//! Holder token generation and validation.

use crate::error::{HolderError, HolderResult};

/// The blob service keeps its own bookkeeping row under this holder name,
/// so it can never be used as a real holder.
pub const RESERVED_HOLDER: &str = "_";

/// Generate a fresh, unique holder token.
///
/// Device-owned holders are prefixed with the device id (`"{prefix}:{id}"`)
/// so they can be attributed later. Keyserver-owned holders carry no prefix.
pub fn generate_blob_holder(prefix: Option<&str>) -> String {
    let id = nanoid::nanoid!();
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{id}"),
        _ => id,
    }
}

/// Check that a holder token can be recorded locally without ambiguity.
///
/// The blob service applies stricter rules of its own (a minimum length);
/// those surface as a failed remote call rather than a local error.
pub fn validate_holder(holder: &str) -> HolderResult<()> {
    if holder.is_empty()
        || holder == RESERVED_HOLDER
        || holder.chars().any(char::is_whitespace)
    {
        tracing::debug!("Invalid holder: {}", holder);
        return Err(HolderError::InvalidHolder(holder.to_string()));
    }
    Ok(())
}

/// Check that a blob hash can address a blob.
/// Hashes end up as URL path segments.
pub fn validate_blob_hash(blob_hash: &str) -> HolderResult<()> {
    if blob_hash.is_empty()
        || blob_hash.contains('/')
        || blob_hash.chars().any(char::is_whitespace)
    {
        tracing::debug!("Invalid blob hash: {}", blob_hash);
        return Err(HolderError::InvalidBlobHash(blob_hash.to_string()));
    }
    Ok(())
}
