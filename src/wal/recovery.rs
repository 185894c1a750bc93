//! WAL Recovery
//!
//! Reads the log after a restart, repairs a torn tail and works out which
//! operations never durably completed.

use std::fs::OpenOptions;
use std::path::Path;

use crate::config::Discipline;
use crate::error::Result;
use super::{LogRecord, Operation, Phase, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of well-formed records read
    pub records_recovered: u64,

    /// Byte length of the well-formed prefix
    pub valid_len: u64,

    /// Whether the log ended in a torn line (cut off by `recover`)
    pub was_truncated: bool,

    /// Whether reading stopped at a malformed line with records after it;
    /// the file is left as it is
    pub stopped_mid_log: bool,
}

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// This will:
    /// 1. Read all well-formed records from the start
    /// 2. Stop at the first incomplete or undecodable line
    /// 3. If that line is a torn tail, cut the file back to the well-formed
    ///    prefix so later appends start on a fresh line
    ///
    /// A bad line with records after it is never cut: those records stay on
    /// disk and `stopped_mid_log` is set. A missing file yields no records.
    pub fn recover(path: &Path) -> Result<(Vec<LogRecord>, RecoveryResult)> {
        let (records, result) = Self::scan(path)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
            tracing::warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                "Truncated unusable WAL tail"
            );
        } else if result.stopped_mid_log {
            tracing::warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                "Malformed WAL line before later records; log left untouched"
            );
        }

        Ok((records, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, result)| result)
    }

    /// Operations that must be replayed against the last snapshot
    ///
    /// - `Simple`: every `TASK` record except `INIT`, in log order
    /// - `DurableAck`: `START` pushes, `SUCCESS` pops the most recent
    ///   pending start; whatever is left was never acknowledged
    ///
    /// `INIT` records never take part in either rule.
    pub fn pending(records: &[LogRecord], discipline: Discipline) -> Vec<LogRecord> {
        let relevant = records
            .iter()
            .filter(|record| !matches!(record.operation, Operation::Init));

        match discipline {
            Discipline::Simple => relevant
                .filter(|record| record.phase == Phase::Task)
                .cloned()
                .collect(),
            Discipline::DurableAck => {
                let mut stack: Vec<LogRecord> = Vec::new();
                for record in relevant {
                    match record.phase {
                        Phase::Start => stack.push(record.clone()),
                        Phase::Success => match stack.pop() {
                            Some(started) if started.operation != record.operation => {
                                tracing::warn!(
                                    started = %started.operation.kind(),
                                    acknowledged = %record.operation.kind(),
                                    "SUCCESS does not match most recent START"
                                );
                            }
                            Some(_) => {}
                            None => tracing::warn!(
                                operation = %record.operation.kind(),
                                "SUCCESS without a pending START"
                            ),
                        },
                        Phase::Task => tracing::warn!(
                            operation = %record.operation.kind(),
                            "Ignoring single-phase record in two-phase log"
                        ),
                    }
                }
                stack
            }
        }
    }

    fn scan(path: &Path) -> Result<(Vec<LogRecord>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut records = Vec::new();
        while let Some(record) = reader.next_record()? {
            records.push(record);
        }

        let result = RecoveryResult {
            records_recovered: records.len() as u64,
            valid_len: reader.valid_len(),
            was_truncated: reader.stopped_at_tail(),
            stopped_mid_log: reader.stopped_mid_log(),
        };
        Ok((records, result))
    }
}
