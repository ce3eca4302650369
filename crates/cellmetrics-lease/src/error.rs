use cellmetrics_state::StateError;
use thiserror::Error;

/// Terminal failure of a held lease.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Renewal failed; another process may already be the holder.
    #[error("lease {name} lost: {reason}")]
    Lost { name: String, reason: String },
}

/// Errors returned by a [`LeaseStore`](crate::LeaseStore).
#[derive(Debug, Error)]
pub enum LeaseStoreError {
    /// The lease no longer belongs to the handle (taken over, expired, or deleted).
    #[error("lease {name} invalidated")]
    Invalidated { name: String },

    #[error(transparent)]
    Store(#[from] StateError),
}
