//! Read-only client interface consumed by the metrics instruments.

use crate::error::StateResult;
use crate::types::*;

/// Read-only view over the cluster-state store.
///
/// Each call returns either the complete collection for one category or
/// an error; there are no partial results. Implementations must be safe
/// to share between instruments without extra synchronization.
pub trait StoreClient: Send + Sync {
    fn tasks(&self) -> StateResult<Vec<Task>>;

    fn desired_lrps(&self) -> StateResult<Vec<DesiredLrp>>;

    fn actual_lrps(&self) -> StateResult<Vec<ActualLrp>>;

    /// Names of the domains that are currently fresh.
    fn domains(&self) -> StateResult<Vec<String>>;

    fn service_registrations(&self) -> StateResult<Vec<ServiceRegistration>>;

    fn store_members(&self) -> StateResult<Vec<StoreMember>>;
}
