//! Health of the store's own consensus cluster.
//!
//! Role counts follow the usual `-1` degrade. The remaining gauges (term,
//! watchers, rates) are not counts, so a failed fetch omits them instead
//! of reporting a value that could be mistaken for a measurement.

use std::sync::Arc;

use cellmetrics_state::{MemberRole, StoreClient, StoreMember};
use tracing::warn;

use super::{emit_counts, Instrument};
use crate::sink::{MetricSink, Unit};

pub const STORE_LEADERS: &str = "StoreLeaders";
pub const STORE_FOLLOWERS: &str = "StoreFollowers";
pub const STORE_CANDIDATES: &str = "StoreCandidates";
pub const STORE_RAFT_TERM: &str = "StoreRaftTerm";
pub const STORE_WATCHERS: &str = "StoreWatchers";
pub const STORE_RECEIVED_REQUEST_RATE: &str = "StoreReceivedRequestRate";
pub const STORE_SENT_REQUEST_RATE: &str = "StoreSentRequestRate";
pub const STORE_RECEIVED_BANDWIDTH_RATE: &str = "StoreReceivedBandwidthRate";
pub const STORE_SENT_BANDWIDTH_RATE: &str = "StoreSentBandwidthRate";

const ROLE_BUCKETS: [(MemberRole, &str); 3] = [
    (MemberRole::Leader, STORE_LEADERS),
    (MemberRole::Follower, STORE_FOLLOWERS),
    (MemberRole::Candidate, STORE_CANDIDATES),
];

pub struct StoreHealthInstrument {
    client: Arc<dyn StoreClient>,
}

impl StoreHealthInstrument {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

fn sum_rates(members: &[StoreMember], rate: impl Fn(&StoreMember) -> Option<f64>) -> f64 {
    members.iter().filter_map(rate).sum()
}

impl Instrument for StoreHealthInstrument {
    fn name(&self) -> &'static str {
        "store_health"
    }

    fn sample(&self, sink: &dyn MetricSink) {
        let members = match self.client.store_members() {
            Ok(members) => members,
            Err(e) => {
                warn!(instrument = self.name(), error = %e, "failed to fetch store members");
                emit_counts(sink, &ROLE_BUCKETS, None::<&[StoreMember]>, |m| m.role);
                return;
            }
        };

        emit_counts(sink, &ROLE_BUCKETS, Some(members.as_slice()), |m| m.role);

        if let Some(term) = members.iter().map(|m| m.raft_term).max() {
            sink.send(STORE_RAFT_TERM, term as f64, Unit::Metric);
        }
        if let Some(leader) = members.iter().find(|m| m.role == MemberRole::Leader) {
            sink.send(STORE_WATCHERS, leader.watchers as f64, Unit::Metric);
        }

        let rates = [
            (
                STORE_RECEIVED_REQUEST_RATE,
                Unit::RequestsPerSecond,
                sum_rates(&members, |m| m.recv_pkg_rate),
            ),
            (
                STORE_SENT_REQUEST_RATE,
                Unit::RequestsPerSecond,
                sum_rates(&members, |m| m.send_pkg_rate),
            ),
            (
                STORE_RECEIVED_BANDWIDTH_RATE,
                Unit::BytesPerSecond,
                sum_rates(&members, |m| m.recv_bandwidth_rate),
            ),
            (
                STORE_SENT_BANDWIDTH_RATE,
                Unit::BytesPerSecond,
                sum_rates(&members, |m| m.send_bandwidth_rate),
            ),
        ];
        for (name, unit, value) in rates {
            sink.send(name, value, unit);
        }
    }
}
