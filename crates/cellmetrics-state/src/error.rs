//! Error types for the cellmetrics state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// The store could not be reached (used by remote clients and fakes).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lease operation was refused because the caller no longer owns it.
    #[error("lease {name} not held by {holder}")]
    LeaseNotHeld { name: String, holder: String },
}
