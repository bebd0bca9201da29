//! Error types for the kubemon-sync crate.

use thiserror::Error;

/// Errors talking to the external monitor store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request could not be sent or the response not read.
    #[error("{operation} request failed: {reason}")]
    Transport {
        /// The store operation, e.g. "list".
        operation: &'static str,
        /// The transport failure.
        reason: String,
    },

    /// The store answered with a non-success status.
    #[error("{operation} returned status {status}: {body}")]
    Api {
        /// The store operation.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A response body did not decode.
    #[error("failed to decode {operation} response: {reason}")]
    Decode {
        /// The store operation.
        operation: &'static str,
        /// The decoder message.
        reason: String,
    },

    /// The store has no monitor with this id.
    #[error("monitor not found: {id}")]
    NotFound {
        /// The missing identifier.
        id: i64,
    },

    /// A store monitor came back without an identifier.
    #[error("monitor has no id: {name}")]
    MissingId {
        /// The monitor name.
        name: String,
    },

    /// Some deletes in a batch failed.
    #[error("failed to delete {failed} of {attempted} monitors")]
    DeleteFailed {
        /// Number of failed deletes.
        failed: usize,
        /// Number of deletes attempted.
        attempted: usize,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, SyncError>;
