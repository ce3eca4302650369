//! redb table definitions for the cellmetrics state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Tasks keyed by `{task_guid}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Desired LRPs keyed by `{process_guid}`.
pub const DESIRED_LRPS: TableDefinition<&str, &[u8]> = TableDefinition::new("desired_lrps");

/// Actual LRPs keyed by `{process_guid}:{index}`.
pub const ACTUAL_LRPS: TableDefinition<&str, &[u8]> = TableDefinition::new("actual_lrps");

/// Domains keyed by `{name}`.
pub const DOMAINS: TableDefinition<&str, &[u8]> = TableDefinition::new("domains");

/// Service registrations keyed by `{kind}:{id}`.
pub const SERVICE_REGISTRATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("service_registrations");

/// Store cluster members keyed by `{name}`.
pub const STORE_MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("store_members");

/// Lease records keyed by `{lease_name}`.
pub const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");
