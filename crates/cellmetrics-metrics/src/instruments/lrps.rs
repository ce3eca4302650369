use std::sync::Arc;

use cellmetrics_state::{ActualLrpState, StoreClient};
use tracing::warn;

use super::{emit_counts, Instrument, UNKNOWN};
use crate::sink::{MetricSink, Unit};

pub const LRPS_DESIRED: &str = "LRPsDesired";
pub const LRPS_UNCLAIMED: &str = "LRPsUnclaimed";
pub const LRPS_CLAIMED: &str = "LRPsClaimed";
pub const LRPS_RUNNING: &str = "LRPsRunning";
pub const LRPS_CRASHED: &str = "LRPsCrashed";

const ACTUAL_BUCKETS: [(ActualLrpState, &str); 4] = [
    (ActualLrpState::Unclaimed, LRPS_UNCLAIMED),
    (ActualLrpState::Claimed, LRPS_CLAIMED),
    (ActualLrpState::Running, LRPS_RUNNING),
    (ActualLrpState::Crashed, LRPS_CRASHED),
];

/// Reports desired instance totals and actual instances per state.
///
/// The two fetches are independent: a failed desired fetch does not
/// affect the actual counts and vice versa.
pub struct LrpInstrument {
    client: Arc<dyn StoreClient>,
}

impl LrpInstrument {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

impl Instrument for LrpInstrument {
    fn name(&self) -> &'static str {
        "lrps"
    }

    fn sample(&self, sink: &dyn MetricSink) {
        let desired = match self.client.desired_lrps() {
            Ok(lrps) => lrps.iter().map(|l| u64::from(l.instances)).sum::<u64>() as f64,
            Err(e) => {
                warn!(instrument = self.name(), error = %e, "failed to fetch desired lrps");
                UNKNOWN
            }
        };
        sink.send(LRPS_DESIRED, desired, Unit::Metric);

        let actual = match self.client.actual_lrps() {
            Ok(lrps) => Some(lrps),
            Err(e) => {
                warn!(instrument = self.name(), error = %e, "failed to fetch actual lrps");
                None
            }
        };
        emit_counts(sink, &ACTUAL_BUCKETS, actual.as_deref(), |l| l.state);
    }
}
