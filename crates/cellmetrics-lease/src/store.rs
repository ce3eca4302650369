//! Lease store interface and its redb-backed implementation.

use std::time::Duration;

use cellmetrics_state::{StateError, StateStore};

use crate::error::LeaseStoreError;

/// Proof of a successful acquisition, required to renew or release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseHandle {
    pub name: String,
    pub holder: String,
    pub revision: u64,
    pub ttl: Duration,
}

/// A store that hands out exclusive, TTL-bounded leases.
///
/// At most one `try_acquire` for a given name succeeds while the lease is
/// live; the manager relies on that and does not re-check it.
pub trait LeaseStore: Send + Sync {
    /// Try to create the lease. `Ok(None)` means another holder owns it.
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseHandle>, LeaseStoreError>;

    /// Push the expiry out by the handle's TTL.
    fn renew(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError>;

    /// Delete the lease record if it is still ours.
    fn release(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError>;
}

impl LeaseStore for StateStore {
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseHandle>, LeaseStoreError> {
        let record = self.try_acquire_lease(name, holder, ttl)?;
        Ok(record.map(|r| LeaseHandle {
            name: r.name,
            holder: r.holder,
            revision: r.revision,
            ttl,
        }))
    }

    fn renew(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
        match self.renew_lease(&handle.name, &handle.holder, handle.revision, handle.ttl) {
            Ok(_) => Ok(()),
            Err(StateError::LeaseNotHeld { name, .. }) => {
                Err(LeaseStoreError::Invalidated { name })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
        if self.release_lease(&handle.name, &handle.holder, handle.revision)? {
            Ok(())
        } else {
            Err(LeaseStoreError::Invalidated {
                name: handle.name.clone(),
            })
        }
    }
}
