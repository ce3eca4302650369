//! StateStore: redb-backed cluster-state persistence.
//!
//! Holds the record tables sampled by the instruments plus the lease
//! table used for single-reporter election. Lease mutations run inside
//! one redb write transaction each; redb serializes write transactions,
//! which is what makes acquisition exclusive.
//!
//! A store opened with [`StateStore::open`] keeps the database file (and
//! its OS lock) for its whole lifetime. [`StateStore::open_shared`] opens
//! the file for each operation instead, so every reporter on a host and
//! the cluster components writing records can use the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::client::StoreClient;
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// How long a shared-mode operation waits for another process to let go
/// of the database file.
pub const SHARED_BUSY_TIMEOUT: Duration = Duration::from_secs(1);

const SHARED_RETRY_PAUSE: Duration = Duration::from_millis(5);

#[derive(Clone)]
enum Backend {
    /// Database held open for the lifetime of the store.
    Owned(Arc<Database>),
    /// Database file opened per operation.
    Shared(Arc<PathBuf>),
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    backend: Backend,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// The file stays locked until the last clone is dropped; a second
    /// open of the same file fails with [`StateError::Open`].
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            backend: Backend::Owned(Arc::new(db)),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Open (or create) a state store whose file can be shared between
    /// processes.
    ///
    /// Each operation takes the file lock for one transaction. When another
    /// process holds it for longer than [`SHARED_BUSY_TIMEOUT`] the
    /// operation fails with [`StateError::Unavailable`].
    pub fn open_shared(path: &Path) -> StateResult<Self> {
        let store = Self {
            backend: Backend::Shared(Arc::new(path.to_path_buf())),
        };
        store.ensure_tables()?;
        debug!(?path, "shared state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            backend: Backend::Owned(Arc::new(db)),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn with_db<R>(&self, f: impl FnOnce(&Database) -> StateResult<R>) -> StateResult<R> {
        match &self.backend {
            Backend::Owned(db) => f(db),
            Backend::Shared(path) => {
                let db = open_when_free(path)?;
                f(&db)
            }
        }
    }

    fn ensure_tables(&self) -> StateResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            for table in [
                TASKS,
                DESIRED_LRPS,
                ACTUAL_LRPS,
                DOMAINS,
                SERVICE_REGISTRATIONS,
                STORE_MEMBERS,
                LEASES,
            ] {
                txn.open_table(table).map_err(map_err!(Table))?;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(())
        })
    }

    // ── Generic record access ──────────────────────────────────────

    fn put_record<T: Serialize>(&self, table: Table, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        self.with_db(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            {
                let mut table = txn.open_table(table).map_err(map_err!(Table))?;
                table
                    .insert(key, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(())
        })
    }

    fn list_records<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(table).map_err(map_err!(Table))?;
            let mut results = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
            Ok(results)
        })
    }

    fn delete_record(&self, table: Table, key: &str) -> StateResult<bool> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let existed;
            {
                let mut table = txn.open_table(table).map_err(map_err!(Table))?;
                existed = table.remove(key).map_err(map_err!(Write))?.is_some();
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(existed)
        })
    }

    // ── Cluster records ────────────────────────────────────────────

    pub fn put_task(&self, task: &Task) -> StateResult<()> {
        self.put_record(TASKS, &task.task_guid, task)
    }

    pub fn delete_task(&self, task_guid: &str) -> StateResult<bool> {
        self.delete_record(TASKS, task_guid)
    }

    pub fn put_desired_lrp(&self, lrp: &DesiredLrp) -> StateResult<()> {
        self.put_record(DESIRED_LRPS, &lrp.process_guid, lrp)
    }

    pub fn put_actual_lrp(&self, lrp: &ActualLrp) -> StateResult<()> {
        self.put_record(ACTUAL_LRPS, &lrp.table_key(), lrp)
    }

    /// Insert or refresh a domain. A zero `ttl` never expires.
    pub fn upsert_domain(&self, name: &str, ttl: Duration) -> StateResult<()> {
        let expires_at_ms = if ttl.is_zero() {
            0
        } else {
            expiry_after(epoch_millis(), ttl)
        };
        let record = DomainRecord {
            name: name.to_string(),
            expires_at_ms,
        };
        self.put_record(DOMAINS, name, &record)?;
        debug!(domain = %name, expires_at_ms, "domain upserted");
        Ok(())
    }

    pub fn put_service_registration(&self, registration: &ServiceRegistration) -> StateResult<()> {
        self.put_record(SERVICE_REGISTRATIONS, &registration.table_key(), registration)
    }

    pub fn put_store_member(&self, member: &StoreMember) -> StateResult<()> {
        self.put_record(STORE_MEMBERS, &member.name, member)
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Get the current lease row, expired or not.
    pub fn get_lease(&self, name: &str) -> StateResult<Option<LeaseRecord>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            read_lease(&table, name)
        })
    }

    /// Create the lease for `holder` unless a live lease belongs to someone else.
    ///
    /// Returns `None` when the lease is currently held by another holder.
    /// An expired lease, or one already held by `holder`, is taken over
    /// with a new revision.
    pub fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> StateResult<Option<LeaseRecord>> {
        let acquired = self.with_db(|db| {
            let now = epoch_millis();
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let acquired;
            {
                let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
                let existing = read_lease(&table, name)?;

                if let Some(current) = &existing {
                    if current.holder != holder && !current.is_expired(now) {
                        debug!(lease = %name, holder = %current.holder, "lease held elsewhere");
                        return Ok(None);
                    }
                }

                let record = LeaseRecord {
                    name: name.to_string(),
                    holder: holder.to_string(),
                    expires_at_ms: expiry_after(now, ttl),
                    revision: existing.map(|r| r.revision + 1).unwrap_or(1),
                };
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(name, value.as_slice())
                    .map_err(map_err!(Write))?;
                acquired = record;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(Some(acquired))
        })?;
        if let Some(record) = &acquired {
            debug!(lease = %name, %holder, revision = record.revision, "lease acquired");
        }
        Ok(acquired)
    }

    /// Extend a live lease owned by `holder` at `revision`.
    ///
    /// Fails with [`StateError::LeaseNotHeld`] if the row is gone, expired,
    /// owned by someone else, or was re-acquired since.
    pub fn renew_lease(
        &self,
        name: &str,
        holder: &str,
        revision: u64,
        ttl: Duration,
    ) -> StateResult<LeaseRecord> {
        let not_held = || StateError::LeaseNotHeld {
            name: name.to_string(),
            holder: holder.to_string(),
        };

        self.with_db(|db| {
            let now = epoch_millis();
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let renewed;
            {
                let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
                let mut record = read_lease(&table, name)?.ok_or_else(not_held)?;
                if record.holder != holder
                    || record.revision != revision
                    || record.is_expired(now)
                {
                    return Err(not_held());
                }
                record.expires_at_ms = expiry_after(now, ttl);
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(name, value.as_slice())
                    .map_err(map_err!(Write))?;
                renewed = record;
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(renewed)
        })
    }

    /// Delete the lease if it is still owned by `holder` at `revision`.
    ///
    /// Returns false when there was nothing of ours to delete.
    pub fn release_lease(&self, name: &str, holder: &str, revision: u64) -> StateResult<bool> {
        let released = self.with_db(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            let released;
            {
                let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
                let ours = read_lease(&table, name)?
                    .is_some_and(|r| r.holder == holder && r.revision == revision);
                released = ours && table.remove(name).map_err(map_err!(Write))?.is_some();
            }
            txn.commit().map_err(map_err!(Transaction))?;
            Ok(released)
        })?;
        debug!(lease = %name, %holder, released, "lease release");
        Ok(released)
    }

    /// Remove a lease regardless of owner (operator takeover).
    pub fn delete_lease(&self, name: &str) -> StateResult<bool> {
        self.delete_record(LEASES, name)
    }
}

/// Open `path`, waiting up to [`SHARED_BUSY_TIMEOUT`] while another
/// handle holds the file lock.
fn open_when_free(path: &Path) -> StateResult<Database> {
    let deadline = Instant::now() + SHARED_BUSY_TIMEOUT;
    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
                std::thread::sleep(SHARED_RETRY_PAUSE);
            }
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                return Err(StateError::Unavailable(format!(
                    "{} is locked by another process",
                    path.display()
                )));
            }
            Err(e) => return Err(StateError::Open(e.to_string())),
        }
    }
}

/// Absolute expiry `ttl` after `now_ms`, clamped to `u64::MAX`.
fn expiry_after(now_ms: u64, ttl: Duration) -> u64 {
    now_ms.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}

fn read_lease(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    name: &str,
) -> StateResult<Option<LeaseRecord>> {
    match table.get(name).map_err(map_err!(Read))? {
        Some(guard) => {
            let record: LeaseRecord =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

impl StoreClient for StateStore {
    fn tasks(&self) -> StateResult<Vec<Task>> {
        self.list_records(TASKS)
    }

    fn desired_lrps(&self) -> StateResult<Vec<DesiredLrp>> {
        self.list_records(DESIRED_LRPS)
    }

    fn actual_lrps(&self) -> StateResult<Vec<ActualLrp>> {
        self.list_records(ACTUAL_LRPS)
    }

    fn domains(&self) -> StateResult<Vec<String>> {
        let now = epoch_millis();
        let domains: Vec<DomainRecord> = self.list_records(DOMAINS)?;
        Ok(domains
            .into_iter()
            .filter(|d| d.is_fresh(now))
            .map(|d| d.name)
            .collect())
    }

    fn service_registrations(&self) -> StateResult<Vec<ServiceRegistration>> {
        self.list_records(SERVICE_REGISTRATIONS)
    }

    fn store_members(&self) -> StateResult<Vec<StoreMember>> {
        self.list_records(STORE_MEMBERS)
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
