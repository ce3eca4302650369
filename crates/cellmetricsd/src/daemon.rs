//! Daemon assembly: state store, sinks, collector, lease and endpoint.
//!
//! Every reporter on a host points at the same `data_dir`. The store file
//! there is opened in shared mode, so standby reporters reach the lease
//! and wait their turn, and the cluster components that write records use
//! the same file through [`StateStore::open_shared`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cellmetrics_lease::LeaseManager;
use cellmetrics_metrics::{FanoutSink, GaugeRegistry, LogSink, MetricsCollector};
use cellmetrics_state::{StateStore, StoreClient};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::http;
use crate::supervisor::Supervisor;

/// File name of the state store inside `data_dir`.
pub const STORE_FILE: &str = "cellmetrics.redb";

/// Location of the state store for `data_dir`.
pub fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORE_FILE)
}

pub struct Daemon {
    config: Config,
    registry: Arc<GaugeRegistry>,
    collector: Arc<MetricsCollector>,
    lease: Arc<LeaseManager>,
}

impl Daemon {
    /// Open the shared store under `config.data_dir` and wire everything up.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        let db_path = store_path(&config.data_dir);

        let state = StateStore::open_shared(&db_path)
            .with_context(|| format!("opening state store {}", db_path.display()))?;
        info!(path = ?db_path, "state store opened");
        let client: Arc<dyn StoreClient> = Arc::new(state.clone());

        let registry = Arc::new(GaugeRegistry::new());
        let sink = FanoutSink::new()
            .with(Arc::new(LogSink))
            .with(registry.clone());
        let instruments = config
            .instruments
            .iter()
            .map(|kind| kind.build(client.clone()))
            .collect();
        let collector = Arc::new(MetricsCollector::new(
            instruments,
            Arc::new(sink),
            config.report_interval,
        ));

        let lease = Arc::new(LeaseManager::new(Arc::new(state), config.lease.clone()));
        info!(holder = %lease.holder_id(), "lease manager initialized");

        Ok(Self {
            config,
            registry,
            collector,
            lease,
        })
    }

    pub fn registry(&self) -> &Arc<GaugeRegistry> {
        &self.registry
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn lease(&self) -> &Arc<LeaseManager> {
        &self.lease
    }

    /// Serve the endpoint (if configured) and supervise until `shutdown`
    /// fires or the lease is lost.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let server = match self.config.listen {
            Some(addr) => {
                let listener = tokio::net::TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("binding {addr}"))?;
                info!(%addr, "metrics endpoint listening");
                let mut server_shutdown = shutdown.clone();
                let router = http::build_router(self.registry.clone());
                Some(tokio::spawn(async move {
                    axum::serve(listener, router)
                        .with_graceful_shutdown(async move {
                            let _ = server_shutdown.wait_for(|stop| *stop).await;
                        })
                        .await
                }))
            }
            None => None,
        };

        let result = Supervisor::new(self.lease, self.collector).run(shutdown).await;

        if let Some(server) = server {
            // On lease loss the shutdown signal never fires.
            if result.is_err() {
                server.abort();
            }
            match server.await {
                Ok(Err(e)) => warn!(error = %e, "metrics endpoint failed"),
                Ok(Ok(())) | Err(_) => {}
            }
        }

        result
    }
}
