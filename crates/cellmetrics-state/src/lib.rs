//! cellmetrics-state: cluster-state records and the store they live in.
//!
//! Defines the record types sampled by the metrics instruments (tasks,
//! desired/actual LRPs, domains, service registrations, store members),
//! the read-only [`StoreClient`] trait the instruments consume, and an
//! embedded [redb](https://docs.rs/redb) backed [`StateStore`] that
//! implements it and also persists lease records.
//!
//! # Architecture
//!
//! ```text
//! StateStore (Arc<Database>, Clone + Send + Sync)
//!   ├── put_*/delete_*  ← writers (tests, store replication)
//!   ├── StoreClient     → tasks(), desired_lrps(), actual_lrps(), ...
//!   └── lease table     → try_acquire_lease(), renew_lease(), release_lease()
//! ```
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! [`StateStore::open_shared`] lets several processes (reporters and the
//! components writing records) work on one database file.

pub mod client;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use client::StoreClient;
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
