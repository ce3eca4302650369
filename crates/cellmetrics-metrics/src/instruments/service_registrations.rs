use std::sync::Arc;

use cellmetrics_state::{ServiceKind, StoreClient};
use tracing::warn;

use super::{emit_counts, Instrument};
use crate::sink::MetricSink;

pub const REGISTRATIONS_EXECUTOR: &str = "ServiceRegistrations.Executor";
pub const REGISTRATIONS_FILE_SERVER: &str = "ServiceRegistrations.FileServer";

const BUCKETS: [(ServiceKind, &str); 2] = [
    (ServiceKind::Executor, REGISTRATIONS_EXECUTOR),
    (ServiceKind::FileServer, REGISTRATIONS_FILE_SERVER),
];

/// Counts registered components per service kind.
pub struct ServiceRegistrationInstrument {
    client: Arc<dyn StoreClient>,
}

impl ServiceRegistrationInstrument {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

impl Instrument for ServiceRegistrationInstrument {
    fn name(&self) -> &'static str {
        "service_registrations"
    }

    fn sample(&self, sink: &dyn MetricSink) {
        let registrations = match self.client.service_registrations() {
            Ok(registrations) => Some(registrations),
            Err(e) => {
                warn!(
                    instrument = self.name(),
                    error = %e,
                    "failed to fetch service registrations"
                );
                None
            }
        };
        emit_counts(sink, &BUCKETS, registrations.as_deref(), |r| r.name);
    }
}
