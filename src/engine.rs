//! Engine Module
//!
//! The store engine that coordinates the WAL, the keyspace and the snapshot
//! backend.
//!
//! ## Responsibilities
//! - Recover state on open
//! - Log every mutation before applying it
//! - Persist a full snapshot after every mutation
//! - Expire keys lazily on access

use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::command::{Command, Reply};
use crate::config::{Config, Discipline};
use crate::error::{QuillError, Result};
use crate::keyspace::{self, Entry, Keyspace};
use crate::recovery::{self, RecoveryReport};
use crate::storage::{self, SnapshotBackend};
use crate::wal::{LogRecord, Operation, WalWriter};

/// A single named key-value store
///
/// ## Concurrency Model: single caller
///
/// Every operation takes `&mut self` and finishes its WAL append, in-memory
/// update and snapshot persist before returning. Callers that share a store
/// between threads must wrap the whole store in their own lock.
///
/// ## Mutation Path
/// 1. Append a TASK (simple) or START (durable-ack) record; on failure
///    nothing else happens
/// 2. Apply the mutation to the keyspace
/// 3. Persist the snapshot
/// 4. Append SUCCESS (durable-ack only)
pub struct Store<B: SnapshotBackend = Box<dyn SnapshotBackend>> {
    /// Store configuration
    config: Config,

    /// Write-ahead log handle
    wal: WalWriter,

    /// Live keys
    keyspace: Keyspace,

    /// Snapshot encoding chosen at construction
    backend: B,

    /// Time source for TTLs and log timestamps
    clock: Arc<dyn Clock>,

    /// Started operations whose SUCCESS has not been written yet, oldest first
    unacknowledged: Vec<LogRecord>,

    /// Outcome of the recovery run during open
    recovery: RecoveryReport,

    /// Set by `drop`; further mutations are refused
    dropped: bool,
}

impl Store {
    /// Open or create a store, using the configured snapshot format
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with a custom time source
    pub fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let backend = storage::backend_for(&config);
        Self::open_with(config, backend, clock)
    }
}

impl<B: SnapshotBackend> Store<B> {
    /// Open or create a store on top of an explicit snapshot backend
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Recover the keyspace from snapshot + WAL
    /// 3. Open the WAL for appending, acknowledge replayed operations and
    ///    log INIT
    /// 4. Sweep expired keys
    pub fn open_with(config: Config, backend: B, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let wal_path = config.wal_path();
        let recovered = recovery::recover(&backend, &wal_path, config.discipline)?;

        let wal = WalWriter::open(&wal_path, config.discipline, config.wal_sync_strategy)?;

        let mut store = Self {
            config,
            wal,
            keyspace: recovered.keyspace,
            backend,
            clock,
            unacknowledged: recovered.unacknowledged,
            recovery: recovered.report,
            dropped: false,
        };

        // Replayed operations are in the snapshot now
        store.acknowledge_outstanding();
        let now = store.clock.now();
        store.wal.begin(Operation::Init, now)?;

        let expired = store.sweep_expired()?;

        tracing::info!(
            name = %store.config.name,
            discipline = %store.config.discipline,
            format = %store.config.snapshot_format,
            keys = store.keyspace.len(),
            expired,
            "Store opened"
        );

        Ok(store)
    }

    /// Execute a command from the command surface
    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Set { key, value, ttl } => {
                self.set(&key, &value, ttl)?;
                Ok(Reply::Ok)
            }
            Command::Incr { key } => Ok(Reply::Integer(self.incr(&key)?)),
            Command::Get { key } => Ok(Reply::Value(self.get(&key))),
            Command::Delete { key } => Ok(Reply::Bool(self.delete(&key)?)),
            Command::Exists { key } => Ok(Reply::Bool(self.exists(&key))),
            Command::Clear => {
                self.clear()?;
                Ok(Reply::Ok)
            }
            Command::Drop => {
                self.drop();
                Ok(Reply::Ok)
            }
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Insert or overwrite `key`
    ///
    /// With a TTL the key expires `ttl` seconds from now. If the WAL append
    /// fails the keyspace is left untouched.
    pub fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        if key.is_empty() {
            return Err(QuillError::EmptyKey);
        }
        self.ensure_live()?;
        self.sweep_expired()?;

        let now = self.clock.now();
        let entry = Entry::with_expiry(value, ttl.and_then(|secs| keyspace::expiry_after(now, secs)));
        let operation = Operation::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl_seconds: ttl,
        };

        self.log_then_apply(operation, |map| {
            map.insert(key, entry);
        })
    }

    /// Add one to an integer value
    ///
    /// Returns the new value, or `None` when the key is missing or its value
    /// is not an integer. Neither case is an error.
    pub fn incr(&mut self, key: &str) -> Result<Option<i64>> {
        self.ensure_live()?;
        self.sweep_expired()?;

        let Some(entry) = self.keyspace.get(key) else {
            tracing::debug!(key, "INCR on missing key");
            return Ok(None);
        };
        let prior = entry.value.clone();

        let Some(next) = keyspace::increment(&prior) else {
            let reason = QuillError::NonIntegerValue {
                key: key.to_string(),
                value: prior,
            };
            tracing::warn!(%reason, "INCR skipped");
            return Ok(None);
        };

        let operation = Operation::Incr {
            key: key.to_string(),
            prior: Some(prior),
        };
        self.log_then_apply(operation, |map| {
            map.set_value(key, next.to_string());
        })?;

        Ok(Some(next))
    }

    /// Look up a key
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.sweep_quietly();
        let now = self.clock.now();
        self.keyspace
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Remove a key
    ///
    /// Returns `false` if the key was not present.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_live()?;
        self.sweep_expired()?;
        self.remove_logged(key)
    }

    /// Whether a live key exists
    pub fn exists(&mut self, key: &str) -> bool {
        self.sweep_quietly();
        let now = self.clock.now();
        self.keyspace
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove every key with a single CLEAR record
    ///
    /// Clearing an empty store writes nothing.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.sweep_expired()?;

        if self.keyspace.is_empty() {
            return Ok(());
        }
        self.log_then_apply(Operation::Clear, Keyspace::clear)
    }

    /// Delete the store: keys, snapshot and log
    ///
    /// Removal errors are logged and otherwise ignored; a missing file means
    /// it is already gone. Afterwards the handle is empty and refuses writes.
    pub fn drop(&mut self) {
        if self.dropped {
            return;
        }

        self.keyspace.clear();
        self.unacknowledged.clear();

        let now = self.clock.now();
        if let Err(e) = self.wal.begin(Operation::Drop, now) {
            tracing::warn!(error = %e, "Could not log DROP");
        }
        if let Err(e) = self.wal.close() {
            tracing::warn!(error = %e, "Could not close WAL");
        }

        if let Err(e) = self.backend.remove() {
            tracing::warn!(error = %e, "Could not remove snapshot");
        }
        match fs::remove_file(self.wal.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "Could not remove WAL"),
        }

        self.dropped = true;
        tracing::info!(name = %self.config.name, "Store dropped");
    }

    /// Sync and close the WAL
    pub fn close(mut self) -> Result<()> {
        self.wal.close()
    }

    // =========================================================================
    // Mutation Internals
    // =========================================================================

    /// Log `operation`, apply it, persist, then acknowledge
    fn log_then_apply<F>(&mut self, operation: Operation, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Keyspace),
    {
        let now = self.clock.now();
        let record = self.wal.begin(operation, now)?;

        apply(&mut self.keyspace);

        if self.config.discipline == Discipline::DurableAck {
            self.unacknowledged.push(record);
        }

        self.backend.persist(&self.keyspace)?;
        self.acknowledge_outstanding();
        Ok(())
    }

    /// Write SUCCESS for every outstanding START, newest first
    ///
    /// Called after a successful persist: the snapshot then contains every
    /// outstanding operation. A failed append keeps the rest outstanding;
    /// they are replayed on the next open if never acknowledged.
    fn acknowledge_outstanding(&mut self) {
        while let Some(record) = self.unacknowledged.pop() {
            let now = self.clock.now();
            if let Err(e) = self.wal.acknowledge(&record, now) {
                tracing::warn!(error = %e, operation = %record.operation.kind(), "Could not acknowledge");
                self.unacknowledged.push(record);
                break;
            }
        }
    }

    fn remove_logged(&mut self, key: &str) -> Result<bool> {
        if !self.keyspace.contains_key(key) {
            return Ok(false);
        }
        let operation = Operation::Delete { key: key.to_string() };
        self.log_then_apply(operation, |map| {
            map.remove(key);
        })?;
        Ok(true)
    }

    /// Delete every expired key through the logged delete path
    fn sweep_expired(&mut self) -> Result<usize> {
        if self.dropped {
            return Ok(0);
        }
        let expired = self.keyspace.expired_keys(self.clock.now());
        for key in &expired {
            tracing::debug!(key = key.as_str(), "Expiring key");
            self.remove_logged(key)?;
        }
        Ok(expired.len())
    }

    /// Sweep on read paths, where failures only get logged
    fn sweep_quietly(&mut self) {
        if let Err(e) = self.sweep_expired() {
            tracing::warn!(error = %e, "Expiry sweep failed");
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.dropped {
            Err(QuillError::Dropped)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of keys held, including expired keys not yet swept
    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyspace.is_empty()
    }

    /// Keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.keyspace.keys().map(str::to_string).collect()
    }

    /// Read-only view of the keyspace
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// What recovery did when this store was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot backend chosen at construction
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn wal(&self) -> &WalWriter {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalWriter {
        &mut self.wal
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }
}
