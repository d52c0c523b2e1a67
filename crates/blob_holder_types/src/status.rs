//! The status of a single holder.

use crate::error::{HolderError, HolderResult};
use std::str::FromStr;

/// Where a holder is in its lifecycle, from the point of view of the local store.
///
/// The lifecycle has two phases. Establishment:
/// `PendingEstablishment -> Established | NotEstablished`, and removal:
/// `PendingRemoval -> (deleted) | NotRemoved`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HolderStatus {
    /// The holder should be alive, but the blob service has not confirmed it yet.
    PendingEstablishment,
    /// The blob service confirmed the holder. The blob is retained.
    Established,
    /// The blob service failed to establish the holder.
    NotEstablished,
    /// The holder should be dead, but the blob service has not confirmed it yet.
    PendingRemoval,
    /// The blob service failed to remove the holder. It is presumed alive.
    NotRemoved,
}

impl HolderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [HolderStatus; 5] = [
        HolderStatus::PendingEstablishment,
        HolderStatus::Established,
        HolderStatus::NotEstablished,
        HolderStatus::PendingRemoval,
        HolderStatus::NotRemoved,
    ];

    /// The persisted representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            HolderStatus::PendingEstablishment => "PENDING_ESTABLISHMENT",
            HolderStatus::Established => "ESTABLISHED",
            HolderStatus::NotEstablished => "NOT_ESTABLISHED",
            HolderStatus::PendingRemoval => "PENDING_REMOVAL",
            HolderStatus::NotRemoved => "NOT_REMOVED",
        }
    }

    /// Whether a blob held with this status may still be served from a cache.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            HolderStatus::Established | HolderStatus::PendingEstablishment
        )
    }

    /// Whether the last remote call for this holder failed and the caller
    /// should try again.
    pub fn needs_retry(&self) -> bool {
        matches!(self, HolderStatus::NotEstablished | HolderStatus::NotRemoved)
    }

    /// Parse a persisted status, failing on anything unrecognized.
    pub fn parse(s: &str) -> HolderResult<Self> {
        s.parse()
    }
}

impl std::fmt::Display for HolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HolderStatus {
    type Err = HolderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_ESTABLISHMENT" => Ok(HolderStatus::PendingEstablishment),
            "ESTABLISHED" => Ok(HolderStatus::Established),
            "NOT_ESTABLISHED" => Ok(HolderStatus::NotEstablished),
            "PENDING_REMOVAL" => Ok(HolderStatus::PendingRemoval),
            "NOT_REMOVED" => Ok(HolderStatus::NotRemoved),
            other => Err(HolderError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(feature = "sqlite")]
impl rusqlite::ToSql for HolderStatus {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(rusqlite::types::ToSqlOutput::Borrowed(
            rusqlite::types::ValueRef::Text(self.as_str().as_bytes()),
        ))
    }
}

#[cfg(feature = "sqlite")]
impl rusqlite::types::FromSql for HolderStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| s.parse().map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e))))
    }
}
