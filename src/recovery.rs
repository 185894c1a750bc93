//! Recovery Engine
//!
//! Rebuilds the keyspace when a store is opened: the last snapshot is the
//! base, and every operation the WAL shows as not durably complete is
//! replayed on top of it in log order.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::Discipline;
use crate::error::{QuillError, Result};
use crate::keyspace::{self, Entry, Keyspace};
use crate::storage::SnapshotBackend;
use crate::wal::{LogRecord, Operation, WalRecovery};

/// What happened while recovering a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Well-formed records found in the log
    pub records_read: u64,

    /// Records selected for replay
    pub pending: u64,

    /// Pending records applied to the keyspace
    pub replayed: u64,

    /// Pending records that could not be applied (e.g. INCR on a non-integer)
    pub failed: u64,

    /// Whether a torn final line was cut off the log
    pub was_truncated: bool,

    /// Whether a malformed line with records after it stopped replay; the
    /// snapshot was trusted as is
    pub stopped_mid_log: bool,

    /// Whether an interrupted DROP was completed
    pub dropped: bool,

    /// Whether the snapshot was rewritten after replay
    pub snapshot_rewritten: bool,
}

/// Output of [`recover`]
#[derive(Debug)]
pub struct Recovered {
    /// The authoritative keyspace, before the expiry sweep
    pub keyspace: Keyspace,

    pub report: RecoveryReport,

    /// Started operations now reflected in the snapshot; the caller appends
    /// a SUCCESS for each (durable-ack only)
    pub unacknowledged: Vec<LogRecord>,
}

/// Rebuild the keyspace from `backend` and the log at `wal_path`
///
/// Steps:
/// 1. Load the snapshot (absent = empty)
/// 2. Read the log, cutting off a torn tail, and pick the pending records
/// 3. Replay them in order; a failing record is skipped, not fatal
/// 4. Persist the result (always for `Simple`, only when something was
///    replayed for `DurableAck`)
///
/// A pending DROP finishes the drop: snapshot and log are removed and the
/// keyspace comes back empty.
///
/// A malformed line in the middle of the log hides the records after it.
/// Every record before it was written before the last snapshot persist, so
/// the snapshot is at least as new as the readable prefix: nothing is
/// replayed, the snapshot is not rewritten, and the log is left intact.
pub fn recover<B>(backend: &B, wal_path: &Path, discipline: Discipline) -> Result<Recovered>
where
    B: SnapshotBackend + ?Sized,
{
    let mut keyspace = backend.load()?;
    let (records, wal_result) = WalRecovery::recover(wal_path)?;

    let mut report = RecoveryReport {
        records_read: wal_result.records_recovered,
        was_truncated: wal_result.was_truncated,
        stopped_mid_log: wal_result.stopped_mid_log,
        ..RecoveryReport::default()
    };

    if wal_result.stopped_mid_log {
        tracing::warn!(
            wal = %wal_path.display(),
            records = report.records_read,
            "WAL unreadable past a malformed line; keeping the snapshot as is"
        );
        return Ok(Recovered {
            keyspace,
            report,
            unacknowledged: Vec::new(),
        });
    }

    let pending = WalRecovery::pending(&records, discipline);
    report.pending = pending.len() as u64;

    if pending.iter().any(|record| record.operation == Operation::Drop) {
        tracing::info!(wal = %wal_path.display(), "Completing interrupted drop");
        backend.remove()?;
        remove_log(wal_path)?;
        report.dropped = true;
        return Ok(Recovered {
            keyspace: Keyspace::new(),
            report,
            unacknowledged: Vec::new(),
        });
    }

    for record in &pending {
        match apply(&mut keyspace, record) {
            Ok(()) => report.replayed += 1,
            Err(e) => {
                tracing::warn!(operation = %record.operation.kind(), error = %e, "Skipping replay of record");
                report.failed += 1;
            }
        }
    }

    let rewrite = match discipline {
        Discipline::Simple => true,
        Discipline::DurableAck => !pending.is_empty(),
    };
    if rewrite {
        backend.persist(&keyspace)?;
        report.snapshot_rewritten = true;
    }

    if report.pending > 0 || report.was_truncated {
        tracing::info!(
            records = report.records_read,
            pending = report.pending,
            replayed = report.replayed,
            failed = report.failed,
            truncated = report.was_truncated,
            "WAL recovery finished"
        );
    }

    let unacknowledged = match discipline {
        Discipline::Simple => Vec::new(),
        Discipline::DurableAck => pending,
    };

    Ok(Recovered {
        keyspace,
        report,
        unacknowledged,
    })
}

/// Apply one logged operation to `keyspace`
///
/// Replaying a record twice leaves the same state as replaying it once:
/// SET and DELETE are absolute, and INCR uses the value recorded before the
/// increment when the record carries one. DELETE and INCR on an absent key
/// are no-ops.
pub fn apply(keyspace: &mut Keyspace, record: &LogRecord) -> Result<()> {
    match &record.operation {
        Operation::Init => {}
        Operation::Set { key, value, ttl_seconds } => {
            let expires_at = ttl_seconds.and_then(|ttl| keyspace::expiry_after(record.timestamp, ttl));
            keyspace.insert(key.clone(), Entry::with_expiry(value.clone(), expires_at));
        }
        Operation::Delete { key } => {
            keyspace.remove(key);
        }
        Operation::Clear | Operation::Drop => keyspace.clear(),
        Operation::Incr { key, prior } => {
            let Some(entry) = keyspace.get(key) else {
                return Ok(());
            };
            let current = entry.value.clone();
            let non_integer = |value: &str| QuillError::NonIntegerValue {
                key: key.clone(),
                value: value.to_string(),
            };

            if current.parse::<i64>().is_err() {
                return Err(non_integer(&current));
            }
            let base = prior.as_deref().unwrap_or(&current);
            let next = keyspace::increment(base).ok_or_else(|| non_integer(base))?;
            keyspace.set_value(key, next.to_string());
        }
    }
    Ok(())
}

fn remove_log(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
