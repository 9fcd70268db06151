//! Error types for `homeguard-core`.
//!
//! Only an invalid restore key is fatal to a request. Storage and delivery
//! failures inside the protocol are recovered locally and surface here only
//! when a read the protocol cannot do without fails.

use homeguard_storage::StorageError;

/// Errors from the restore protocol.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The presented key does not match the stored restore key, or no key
    /// is stored (never issued, consumed, or expired).
    #[error("Restore key is invalid.")]
    InvalidKey,

    /// A storage read required to make a decision failed.
    #[error("restore storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from JSON-lines file writers (event log, mail spool).
#[derive(Debug, thiserror::Error)]
pub enum JsonLinesError {
    /// The file could not be opened for append.
    #[error("failed to open '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Writing or flushing a line failed.
    #[error("write to '{path}' failed: {reason}")]
    Write { path: String, reason: String },

    /// The record could not be serialized.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors from event sinks.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A specific sink failed to record an event.
    #[error("event sink '{name}' failed: {reason}")]
    SinkFailure { name: String, reason: String },
}
