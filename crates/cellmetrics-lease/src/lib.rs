//! cellmetrics-lease: single-active-reporter election.
//!
//! A [`LeaseManager`] acquires a named, TTL-bounded lease from a
//! [`LeaseStore`], keeps renewing it, and tells its caller how holding
//! ended: a clean release on shutdown, or a fatal [`LeaseError::Lost`].
//!
//! # Lifecycle
//!
//! ```text
//! NotHeld ──acquire fails──▶ NotHeld (after retry_interval)
//! NotHeld ──acquire ok────▶ Held ──renew ok──▶ Held
//!                           Held ──renew fails──▶ Lost      (Err)
//! NotHeld | Held ──shutdown──▶ Released                     (Ok)
//! ```
//!
//! Exclusivity itself is the lease store's contract; the manager only
//! makes sure a process never keeps acting as holder after the store has
//! stopped agreeing.

pub mod error;
pub mod manager;
pub mod store;

pub use error::{LeaseError, LeaseStoreError};
pub use manager::{LeaseConfig, LeaseManager, LeaseState};
pub use store::{LeaseHandle, LeaseStore};
