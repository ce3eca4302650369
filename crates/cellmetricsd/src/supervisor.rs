//! Supervisor: ties the lease to the collector.
//!
//! The collector only runs while this process holds the lease:
//!
//! 1. acquire the lease (waiting out any other holder);
//! 2. run the renewal loop and the collector concurrently;
//! 3. on shutdown, stop the collector first, then release the lease;
//! 4. on lease loss, stop the collector and fail.

use std::sync::Arc;

use cellmetrics_lease::LeaseManager;
use cellmetrics_metrics::MetricsCollector;
use tokio::sync::watch;
use tracing::{error, info};

pub struct Supervisor {
    lease: Arc<LeaseManager>,
    collector: Arc<MetricsCollector>,
}

impl Supervisor {
    pub fn new(lease: Arc<LeaseManager>, collector: Arc<MetricsCollector>) -> Self {
        Self { lease, collector }
    }

    /// Run until `shutdown` fires (`Ok`) or the lease is lost (`Err`).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let Some(handle) = self.lease.acquire(&mut shutdown).await else {
            info!("shutdown before the lease was acquired");
            return Ok(());
        };

        let (collector_stop, collector_rx) = watch::channel(false);
        let (lease_stop, lease_rx) = watch::channel(false);

        let collector = self.collector.clone();
        let collector_task = tokio::spawn(async move { collector.run(collector_rx).await });

        let lease = self.lease.clone();
        let mut hold_task = tokio::spawn(async move { lease.hold(handle, lease_rx).await });

        tokio::select! {
            biased;
            held = &mut hold_task => {
                // The renewal loop only ends on its own when the lease is lost.
                let _ = collector_stop.send(true);
                collector_task.await?;
                let result = held?;
                if let Err(e) = &result {
                    error!(error = %e, cycles = self.collector.cycles(), "stopped reporting");
                }
                Ok(result?)
            }
            _ = shutdown_requested(&mut shutdown) => {
                info!("shutdown requested, stopping collector");
                let _ = collector_stop.send(true);
                collector_task.await?;

                let _ = lease_stop.send(true);
                hold_task.await??;
                info!(cycles = self.collector.cycles(), "supervisor stopped");
                Ok(())
            }
        }
    }
}

/// Resolves once shutdown is signalled or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use cellmetrics_lease::{
        LeaseConfig, LeaseError, LeaseHandle, LeaseState, LeaseStore, LeaseStoreError,
    };
    use cellmetrics_metrics::{Instrument, MemorySink, MetricSink, Unit};

    /// Lease store that grants immediately and can be told to start refusing renewals.
    #[derive(Default)]
    struct ScriptedLeases {
        busy_attempts: AtomicU32,
        refuse_renewals: AtomicBool,
        released: AtomicBool,
    }

    impl LeaseStore for ScriptedLeases {
        fn try_acquire(
            &self,
            name: &str,
            holder: &str,
            ttl: Duration,
        ) -> Result<Option<LeaseHandle>, LeaseStoreError> {
            if self.busy_attempts.load(Ordering::SeqCst) > 0 {
                self.busy_attempts.fetch_sub(1, Ordering::SeqCst);
                return Ok(None);
            }
            Ok(Some(LeaseHandle {
                name: name.into(),
                holder: holder.into(),
                revision: 1,
                ttl,
            }))
        }

        fn renew(&self, handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
            if self.refuse_renewals.load(Ordering::SeqCst) {
                return Err(LeaseStoreError::Invalidated {
                    name: handle.name.clone(),
                });
            }
            Ok(())
        }

        fn release(&self, _handle: &LeaseHandle) -> Result<(), LeaseStoreError> {
            self.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Heartbeat;

    impl Instrument for Heartbeat {
        fn name(&self) -> &'static str {
            "heartbeat"
        }

        fn sample(&self, sink: &dyn MetricSink) {
            sink.send("Heartbeat", 1.0, Unit::Metric);
        }
    }

    fn lease_config() -> LeaseConfig {
        LeaseConfig {
            name: "runtime-metrics".into(),
            ttl: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }

    fn supervisor(
        store: Arc<ScriptedLeases>,
    ) -> (Supervisor, Arc<LeaseManager>, Arc<MetricsCollector>) {
        let lease = Arc::new(LeaseManager::new(store, lease_config()));
        let collector = Arc::new(MetricsCollector::new(
            vec![Box::new(Heartbeat) as Box<dyn Instrument>],
            Arc::new(MemorySink::new()),
            Duration::from_secs(60),
        ));
        (
            Supervisor::new(lease.clone(), collector.clone()),
            lease,
            collector,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lease_stops_collector_and_fails() {
        let store = Arc::new(ScriptedLeases::default());
        let (supervisor, lease, collector) = supervisor(store.clone());
        let (_tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move { supervisor.run(rx).await });

        // Two full report cycles while holding.
        tokio::time::sleep(Duration::from_secs(122)).await;
        assert_eq!(collector.cycles(), 2);
        assert_eq!(lease.state(), LeaseState::Held);

        store.refuse_renewals.store(true, Ordering::SeqCst);
        let err = run.await.unwrap().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LeaseError>(),
            Some(LeaseError::Lost { name, .. }) if name == "runtime-metrics"
        ));
        assert_eq!(lease.state(), LeaseState::Lost);
        assert!(!store.released.load(Ordering::SeqCst));

        // Nothing runs after the loss.
        let cycles = collector.cycles();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(collector.cycles(), cycles);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_collector_and_releases_lease() {
        let store = Arc::new(ScriptedLeases::default());
        let (supervisor, lease, collector) = supervisor(store.clone());
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move { supervisor.run(rx).await });

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(collector.cycles(), 1);

        tx.send(true).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(lease.state(), LeaseState::Released);
        assert!(store.released.load(Ordering::SeqCst));
        assert_eq!(collector.cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn standby_emits_nothing_until_acquired() {
        let store = Arc::new(ScriptedLeases {
            busy_attempts: AtomicU32::new(3),
            ..ScriptedLeases::default()
        });
        let (supervisor, lease, collector) = supervisor(store);
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move { supervisor.run(rx).await });

        // Three refused attempts, 5s apart: acquired at t=15s.
        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(lease.state(), LeaseState::NotHeld);

        // First cycle lands one interval after acquisition.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(lease.state(), LeaseState::Held);
        assert_eq!(collector.cycles(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(collector.cycles(), 1);

        tx.send(true).unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_waiting_for_lease_is_clean() {
        let store = Arc::new(ScriptedLeases {
            busy_attempts: AtomicU32::new(u32::MAX),
            ..ScriptedLeases::default()
        });
        let (supervisor, lease, collector) = supervisor(store);
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(async move { supervisor.run(rx).await });
        tokio::time::sleep(Duration::from_secs(30)).await;

        tx.send(true).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(lease.state(), LeaseState::Released);
        assert_eq!(collector.cycles(), 0);
    }
}
