//! cellmetricsd: lease-guarded cluster-state metrics reporter.
//!
//! Assembles the state store, the lease manager, the instruments and the
//! collector loop, and optionally serves the latest values for scraping.

pub mod config;
pub mod daemon;
pub mod http;
pub mod supervisor;

pub use config::{Config, ConfigError, FileConfig};
pub use daemon::Daemon;
pub use supervisor::Supervisor;
