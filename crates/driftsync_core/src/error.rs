//! Error types for the sync core.

use driftsync_protocol::ChangeId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// The in-memory store is infallible; these exist for durable store
/// implementations and for misuse such as acknowledging an unknown
/// change.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The backing change store failed.
    #[error("store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// A change ID was not found in the store.
    #[error("unknown change: {id}")]
    UnknownChange {
        /// The missing change ID.
        id: ChangeId,
    },
}

impl CoreError {
    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}
