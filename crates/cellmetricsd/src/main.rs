//! cellmetricsd: the metrics reporter daemon.
//!
//! # Usage
//!
//! ```text
//! cellmetricsd --config /etc/cellmetrics.toml
//! cellmetricsd --data-dir /var/lib/cellmetrics --report-interval 30s --listen 0.0.0.0:5678
//! ```
//!
//! Several reporters may share one `--data-dir`; only the lease holder
//! reports. Exits non-zero when the reporter lease is lost.

use std::net::SocketAddr;
use std::path::PathBuf;

use cellmetricsd::config::FileConfig;
use cellmetricsd::{Config, Daemon};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cellmetricsd", about = "Cluster-state metrics reporter")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory holding the state store.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address for the /metrics endpoint.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Time between report cycles (e.g. "60s", "1m").
    #[arg(long)]
    report_interval: Option<String>,

    /// Instruments to run, comma separated.
    #[arg(long, value_delimiter = ',')]
    instruments: Option<Vec<String>>,

    /// Name of the reporter lease.
    #[arg(long)]
    lease_name: Option<String>,

    /// Lease time-to-live.
    #[arg(long)]
    lease_ttl: Option<String>,

    /// Pause between lease acquisition attempts.
    #[arg(long)]
    lease_retry_interval: Option<String>,
}

impl Cli {
    /// Read the config file (if any) and overlay the flags on top of it.
    fn load_config(self) -> anyhow::Result<Config> {
        let mut file = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        if self.data_dir.is_some() {
            file.data_dir = self.data_dir;
        }
        if self.listen.is_some() {
            file.listen = self.listen;
        }
        if self.report_interval.is_some() {
            file.report_interval = self.report_interval;
        }
        if self.instruments.is_some() {
            file.instruments = self.instruments;
        }
        if self.lease_name.is_some() {
            file.lease.name = self.lease_name;
        }
        if self.lease_ttl.is_some() {
            file.lease.ttl = self.lease_ttl;
        }
        if self.lease_retry_interval.is_some() {
            file.lease.retry_interval = self.lease_retry_interval;
        }

        Ok(file.validate()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cellmetricsd=debug,cellmetrics=debug".into()),
        )
        .init();

    let config = Cli::parse().load_config()?;

    if let Err(e) = run(config).await {
        error!(error = %e, "cellmetricsd exiting with error");
        return Err(e);
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        report_interval = ?config.report_interval,
        lease = %config.lease.name,
        instruments = ?config.instruments,
        "cellmetricsd starting"
    );

    let daemon = Daemon::open(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    daemon.run(shutdown_rx).await?;
    info!("cellmetricsd stopped");
    Ok(())
}
