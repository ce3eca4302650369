//! Lease manager: acquire, renew, and release the reporter lease.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::LeaseError;
use crate::store::{LeaseHandle, LeaseStore};

/// Lease parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Name of the lease record shared by all competing processes.
    pub name: String,
    /// How long the lease survives without renewal.
    pub ttl: Duration,
    /// Pause between acquisition attempts while someone else holds it.
    pub retry_interval: Duration,
}

impl LeaseConfig {
    /// Renewals happen twice per TTL window.
    pub fn renew_interval(&self) -> Duration {
        self.ttl / 2
    }
}

/// Where this process stands with respect to the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    NotHeld,
    Held,
    Lost,
    Released,
}

/// Owns the lease for one process.
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
    holder_id: String,
    state: watch::Sender<LeaseState>,
}

impl LeaseManager {
    /// Create a manager with a freshly generated holder identity.
    pub fn new(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Self {
        let (state, _) = watch::channel(LeaseState::NotHeld);
        Self {
            store,
            config,
            holder_id: uuid::Uuid::new_v4().to_string(),
            state,
        }
    }

    /// Override the holder identity.
    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Current lease state.
    pub fn state(&self) -> LeaseState {
        *self.state.borrow()
    }

    /// Watch lease state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LeaseState) {
        self.state.send_replace(state);
    }

    /// Block until the lease is ours or shutdown is signalled.
    ///
    /// Contention and store errors are retried every `retry_interval`.
    /// Returns `None` when cancelled; that is not an error.
    pub async fn acquire(&self, shutdown: &mut watch::Receiver<bool>) -> Option<LeaseHandle> {
        let name = &self.config.name;
        info!(lease = %name, holder = %self.holder_id, "acquiring lease");

        loop {
            if *shutdown.borrow() {
                return self.cancel_acquire();
            }

            match self
                .store
                .try_acquire(name, &self.holder_id, self.config.ttl)
            {
                Ok(Some(handle)) => {
                    self.set_state(LeaseState::Held);
                    info!(
                        lease = %name,
                        holder = %self.holder_id,
                        revision = handle.revision,
                        "lease acquired"
                    );
                    return Some(handle);
                }
                Ok(None) => {
                    debug!(
                        lease = %name,
                        retry_in = ?self.config.retry_interval,
                        "lease held elsewhere"
                    );
                }
                Err(e) => {
                    warn!(lease = %name, error = %e, "lease acquisition attempt failed");
                }
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return self.cancel_acquire();
                    }
                }
                _ = tokio::time::sleep(self.config.retry_interval) => {}
            }
        }
    }

    fn cancel_acquire(&self) -> Option<LeaseHandle> {
        self.set_state(LeaseState::Released);
        info!(lease = %self.config.name, "lease acquisition cancelled");
        None
    }

    /// Keep renewing `handle` until shutdown (clean release) or a renewal
    /// fails (lease lost).
    pub async fn hold(
        &self,
        handle: LeaseHandle,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), LeaseError> {
        let renew_every = self.config.renew_interval();
        debug!(lease = %handle.name, interval = ?renew_every, "lease renewal loop started");

        loop {
            if *shutdown.borrow() {
                self.release(&handle);
                return Ok(());
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.release(&handle);
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep(renew_every) => {
                    if let Err(e) = self.store.renew(&handle) {
                        self.set_state(LeaseState::Lost);
                        error!(
                            lease = %handle.name,
                            holder = %handle.holder,
                            error = %e,
                            "lease lost"
                        );
                        return Err(LeaseError::Lost {
                            name: handle.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                    debug!(lease = %handle.name, "lease renewed");
                }
            }
        }
    }

    /// Acquire, then hold until shutdown or loss.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), LeaseError> {
        match self.acquire(&mut shutdown).await {
            Some(handle) => self.hold(handle, shutdown).await,
            None => Ok(()),
        }
    }

    /// Best-effort delete. A failed delete only delays takeover until the TTL runs out.
    fn release(&self, handle: &LeaseHandle) {
        self.set_state(LeaseState::Released);
        match self.store.release(handle) {
            Ok(()) => info!(lease = %handle.name, "lease released"),
            Err(e) => warn!(lease = %handle.name, error = %e, "failed to release lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use cellmetrics_state::{StateError, StateStore};

    use crate::error::LeaseStoreError;

    /// Scripted lease store for driving the manager through each transition.
    #[derive(Default)]
    struct FakeLeaseStore {
        /// Attempts answered with "held elsewhere" before one succeeds.
        busy_attempts: u32,
        /// Renewals that succeed before every later one fails.
        renew_successes: Option<u32>,
        release_fails: bool,
        acquire_calls: AtomicU32,
        renew_calls: AtomicU32,
        release_calls: AtomicU32,
    }

    impl LeaseStore for FakeLeaseStore {
        fn try_acquire(
            &self,
            name: &str,
            holder: &str,
            ttl: Duration,
        ) -> Result<Option<LeaseHandle>, LeaseStoreError> {
            let attempt = self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            if attempt < self.busy_attempts {
                return Ok(None);
            }
            Ok(Some(LeaseHandle {
                name: name.to_string(),
                holder: holder.to_string(),
                revision: 1,
                ttl,
            }))
        }

        fn renew(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
            let n = self.renew_calls.fetch_add(1, Ordering::SeqCst);
            match self.renew_successes {
                Some(ok) if n >= ok => Err(LeaseStoreError::Invalidated {
                    name: handle.name.clone(),
                }),
                _ => Ok(()),
            }
        }

        fn release(&self, _handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
            if self.release_fails {
                Err(StateError::Unavailable("connection refused".to_string()).into())
            } else {
                Ok(())
            }
        }
    }

    fn config() -> LeaseConfig {
        LeaseConfig {
            name: "runtime-metrics".to_string(),
            ttl: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }

    fn manager(store: Arc<FakeLeaseStore>) -> LeaseManager {
        LeaseManager::new(store, config()).with_holder_id("holder-a")
    }

    #[test]
    fn renew_interval_is_half_the_ttl() {
        assert_eq!(config().renew_interval(), Duration::from_secs(5));
    }

    #[test]
    fn holder_ids_are_unique() {
        let store: Arc<dyn LeaseStore> = Arc::new(FakeLeaseStore::default());
        let a = LeaseManager::new(store.clone(), config());
        let b = LeaseManager::new(store, config());
        assert_ne!(a.holder_id(), b.holder_id());
        assert_eq!(a.state(), LeaseState::NotHeld);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_retries_while_held_elsewhere() {
        let store = Arc::new(FakeLeaseStore {
            busy_attempts: 2,
            ..Default::default()
        });
        let manager = manager(store.clone());
        let (_tx, mut rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        let handle = manager.acquire(&mut rx).await.unwrap();

        assert_eq!(handle.holder, "holder-a");
        assert_eq!(store.acquire_calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(manager.state(), LeaseState::Held);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_cancelled_by_shutdown_returns_none() {
        let store = Arc::new(FakeLeaseStore {
            busy_attempts: u32::MAX,
            ..Default::default()
        });
        let manager = Arc::new(manager(store.clone()));
        let (tx, rx) = watch::channel(false);

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert!(store.acquire_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(store.renew_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), LeaseState::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_renewals_lose_the_lease() {
        let store = Arc::new(FakeLeaseStore {
            renew_successes: Some(0),
            ..Default::default()
        });
        let manager = manager(store.clone());
        let (_tx, rx) = watch::channel(false);

        let err = manager.run(rx).await.unwrap_err();

        assert!(matches!(err, LeaseError::Lost { ref name, .. } if name == "runtime-metrics"));
        assert_eq!(manager.state(), LeaseState::Lost);
        assert_eq!(store.renew_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_lost_after_successful_renewals() {
        let store = Arc::new(FakeLeaseStore {
            renew_successes: Some(3),
            ..Default::default()
        });
        let manager = manager(store.clone());
        let (_tx, rx) = watch::channel(false);

        let started = tokio::time::Instant::now();
        assert!(manager.run(rx).await.is_err());
        assert_eq!(store.renew_calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_the_lease() {
        let store = Arc::new(FakeLeaseStore::default());
        let manager = Arc::new(manager(store.clone()));
        let (tx, rx) = watch::channel(false);

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.state(), LeaseState::Held);
        tx.send(true).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(store.renew_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), LeaseState::Released);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_release_is_still_a_clean_exit() {
        let store = Arc::new(FakeLeaseStore {
            release_fails: true,
            ..Default::default()
        });
        let manager = manager(store.clone());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let handle = LeaseHandle {
            name: "runtime-metrics".to_string(),
            holder: "holder-a".to_string(),
            revision: 1,
            ttl: Duration::from_secs(10),
        };
        assert!(manager.hold(handle, rx).await.is_ok());
        assert_eq!(store.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), LeaseState::Released);
    }

    #[tokio::test]
    async fn second_manager_waits_for_release() {
        let store = StateStore::open_in_memory().unwrap();
        let shared: Arc<dyn LeaseStore> = Arc::new(store.clone());
        let fast = LeaseConfig {
            name: "runtime-metrics".to_string(),
            ttl: Duration::from_secs(30),
            retry_interval: Duration::from_millis(10),
        };

        let first = Arc::new(LeaseManager::new(shared.clone(), fast.clone()));
        let second = Arc::new(LeaseManager::new(shared, fast));
        let (first_tx, first_rx) = watch::channel(false);
        let (_second_tx, second_rx) = watch::channel(false);

        let mut first_state = first.subscribe();
        let first_task = {
            let first = first.clone();
            tokio::spawn(async move { first.run(first_rx).await })
        };
        first_state
            .wait_for(|s| *s == LeaseState::Held)
            .await
            .unwrap();

        let mut second_state = second.subscribe();
        let second_task = {
            let second = second.clone();
            tokio::spawn(async move { second.run(second_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second.state(), LeaseState::NotHeld);
        let record = store.get_lease("runtime-metrics").unwrap().unwrap();
        assert_eq!(record.holder, first.holder_id());

        first_tx.send(true).unwrap();
        assert!(first_task.await.unwrap().is_ok());

        second_state
            .wait_for(|s| *s == LeaseState::Held)
            .await
            .unwrap();
        let record = store.get_lease("runtime-metrics").unwrap().unwrap();
        assert_eq!(record.holder, second.holder_id());

        second_task.abort();
    }
}
