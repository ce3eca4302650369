//! Record types stored in the cluster-state store.
//!
//! Every enum that instruments partition on lists its variants in
//! [`ALL`](TaskState::ALL)-style constants so that counts can be emitted
//! for states no record currently occupies.

use serde::{Deserialize, Serialize};

// ── Tasks ─────────────────────────────────────────────────────────

/// A one-off unit of work scheduled on the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_guid: String,
    pub domain: String,
    pub state: TaskState,
}

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Resolving,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Resolving,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Resolving => "Resolving",
        }
    }
}

// ── Long-running processes ────────────────────────────────────────

/// Desired state of a long-running process: how many instances should run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredLrp {
    pub process_guid: String,
    pub domain: String,
    pub instances: u32,
}

/// One running (or attempting to run) instance of a long-running process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActualLrp {
    pub process_guid: String,
    pub index: u32,
    pub domain: String,
    pub state: ActualLrpState,
}

/// Placement/lifecycle state of an [`ActualLrp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualLrpState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

impl ActualLrpState {
    pub const ALL: [ActualLrpState; 4] = [
        ActualLrpState::Unclaimed,
        ActualLrpState::Claimed,
        ActualLrpState::Running,
        ActualLrpState::Crashed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActualLrpState::Unclaimed => "Unclaimed",
            ActualLrpState::Claimed => "Claimed",
            ActualLrpState::Running => "Running",
            ActualLrpState::Crashed => "Crashed",
        }
    }
}

// ── Domains ───────────────────────────────────────────────────────

/// A domain whose owner periodically refreshes it.
///
/// `expires_at_ms == 0` means the domain never goes stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainRecord {
    pub name: String,
    pub expires_at_ms: u64,
}

impl DomainRecord {
    /// Whether the domain is still fresh at `now_ms`.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.expires_at_ms == 0 || self.expires_at_ms > now_ms
    }
}

// ── Service registrations ─────────────────────────────────────────

/// A component that announced itself to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRegistration {
    pub name: ServiceKind,
    pub id: String,
}

/// Known service kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Executor,
    FileServer,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Executor, ServiceKind::FileServer];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Executor => "Executor",
            ServiceKind::FileServer => "FileServer",
        }
    }
}

impl ServiceRegistration {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.name.as_str(), self.id)
    }
}

// ── Store members ─────────────────────────────────────────────────

/// Self-reported statistics of one member of the store's own cluster.
///
/// Rates are optional because followers only report receive rates and
/// the leader only reports send rates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreMember {
    pub name: String,
    pub role: MemberRole,
    pub raft_term: u64,
    pub watchers: u64,
    pub recv_pkg_rate: Option<f64>,
    pub recv_bandwidth_rate: Option<f64>,
    pub send_pkg_rate: Option<f64>,
    pub send_bandwidth_rate: Option<f64>,
}

/// Consensus role of a store member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Leader,
    #[default]
    Follower,
    Candidate,
}

impl MemberRole {
    pub const ALL: [MemberRole; 3] = [
        MemberRole::Leader,
        MemberRole::Follower,
        MemberRole::Candidate,
    ];
}

// ── Leases ────────────────────────────────────────────────────────

/// Persisted lease row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseRecord {
    pub name: String,
    pub holder: String,
    /// Unix timestamp (milliseconds) after which the lease may be taken over.
    pub expires_at_ms: u64,
    /// Bumped on every successful acquisition.
    pub revision: u64,
}

impl LeaseRecord {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

impl ActualLrp {
    /// Build the composite key for the actual LRPs table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.process_guid, self.index)
    }
}
