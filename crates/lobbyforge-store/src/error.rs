//! Error types for the store layer.

use crate::RecordKind;

/// Errors that can occur while reading or writing records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write was based on a stale read. `found` is `None` when the
    /// record no longer exists.
    #[error("{kind} {key}: expected version {expected}, found {found:?}")]
    VersionConflict {
        kind: RecordKind,
        key: String,
        expected: u64,
        found: Option<u64>,
    },

    /// A stored row could not be decoded into its record type.
    #[error("{kind} {key} is corrupt: {source}")]
    Corrupt {
        kind: RecordKind,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded for storage.
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` for a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
