//! Daemon configuration: TOML file plus CLI overrides.
//!
//! The file is deserialized into [`FileConfig`], where everything is
//! optional and durations are still strings. [`FileConfig::validate`]
//! fills in defaults and produces the checked [`Config`].

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cellmetrics_lease::LeaseConfig;
use cellmetrics_metrics::instruments::UnknownInstrument;
use cellmetrics_metrics::InstrumentKind;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_LEASE_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LEASE_NAME: &str = "runtime-metrics";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/cellmetrics";
/// Shortest accepted lease TTL. Lease expiry is tracked in milliseconds
/// and renewal runs every half TTL.
pub const MIN_LEASE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field}: invalid duration {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("lease.ttl {ttl:?} is below the minimum of {min:?}")]
    LeaseTtlTooShort { ttl: Duration, min: Duration },

    #[error("lease name must not be empty")]
    EmptyLeaseName,

    #[error("at least one instrument must be enabled")]
    NoInstruments,

    #[error(transparent)]
    UnknownInstrument(#[from] UnknownInstrument),

    #[error("instrument {0} listed more than once")]
    DuplicateInstrument(InstrumentKind),
}

/// Validated daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub report_interval: Duration,
    pub data_dir: PathBuf,
    /// Address of the `/metrics` endpoint; `None` disables it.
    pub listen: Option<SocketAddr>,
    pub instruments: Vec<InstrumentKind>,
    pub lease: LeaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_interval: DEFAULT_REPORT_INTERVAL,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            listen: None,
            instruments: InstrumentKind::ALL.to_vec(),
            lease: LeaseConfig {
                name: DEFAULT_LEASE_NAME.to_string(),
                ttl: DEFAULT_LEASE_TTL,
                retry_interval: DEFAULT_LEASE_RETRY_INTERVAL,
            },
        }
    }
}

/// Raw, unvalidated configuration as written in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub report_interval: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub instruments: Option<Vec<String>>,
    #[serde(default)]
    pub lease: LeaseSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseSection {
    pub name: Option<String>,
    pub ttl: Option<String>,
    pub retry_interval: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply defaults and check every field.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let report_interval =
            duration_field("report_interval", self.report_interval, defaults.report_interval)?;
        let ttl = duration_field("lease.ttl", self.lease.ttl, defaults.lease.ttl)?;
        if ttl < MIN_LEASE_TTL {
            return Err(ConfigError::LeaseTtlTooShort {
                ttl,
                min: MIN_LEASE_TTL,
            });
        }
        let retry_interval = duration_field(
            "lease.retry_interval",
            self.lease.retry_interval,
            defaults.lease.retry_interval,
        )?;

        let name = self.lease.name.unwrap_or(defaults.lease.name);
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyLeaseName);
        }

        let instruments = match self.instruments {
            Some(names) => parse_instruments(&names)?,
            None => defaults.instruments,
        };

        Ok(Config {
            report_interval,
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            listen: self.listen,
            instruments,
            lease: LeaseConfig {
                name,
                ttl,
                retry_interval,
            },
        })
    }
}

fn duration_field(
    field: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let duration = match value {
        Some(raw) => {
            parse_duration(&raw).ok_or(ConfigError::InvalidDuration { field, value: raw })?
        }
        None => default,
    };
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(duration)
}

fn parse_instruments(names: &[String]) -> Result<Vec<InstrumentKind>, ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::NoInstruments);
    }
    let mut seen = HashSet::new();
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let kind: InstrumentKind = name.trim().parse()?;
        if !seen.insert(kind) {
            return Err(ConfigError::DuplicateInstrument(kind));
        }
        kinds.push(kind);
    }
    Ok(kinds)
}

/// Parse a duration string like "500ms", "5s", "1m", "2h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
