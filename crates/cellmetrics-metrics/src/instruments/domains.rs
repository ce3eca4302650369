use std::sync::Arc;

use cellmetrics_state::StoreClient;
use tracing::warn;

use super::Instrument;
use crate::sink::{MetricSink, Unit};

/// Prefix of the per-domain freshness metric.
pub const DOMAIN_PREFIX: &str = "Domain.";

/// Emits `Domain.<name> = 1` for every fresh domain.
///
/// Stale domains are simply absent. When the fetch fails nothing is
/// emitted, since a `-1` would read as a domain that exists.
pub struct DomainInstrument {
    client: Arc<dyn StoreClient>,
}

impl DomainInstrument {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

impl Instrument for DomainInstrument {
    fn name(&self) -> &'static str {
        "domains"
    }

    fn sample(&self, sink: &dyn MetricSink) {
        match self.client.domains() {
            Ok(domains) => {
                for domain in domains {
                    sink.send(&format!("{DOMAIN_PREFIX}{domain}"), 1.0, Unit::Metric);
                }
            }
            Err(e) => warn!(instrument = self.name(), error = %e, "failed to fetch domains"),
        }
    }
}
