//! WAL Writer
//!
//! Owns the log file handle and appends encoded records to it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{Discipline, WalSyncStrategy};
use crate::error::{QuillError, Result};
use super::{codec, LogRecord, Operation, Phase, WalReader};

/// Append-only handle to a store's log file
///
/// Each record goes to the file in a single unbuffered write, so a failed
/// append never leaves bytes behind to be flushed by a later one.
pub struct WalWriter {
    path: PathBuf,
    /// `None` once closed; appends then fail instead of panicking
    file: Option<File>,
    /// File length after the last successful append
    len: u64,
    discipline: Discipline,
    sync_strategy: WalSyncStrategy,
    /// Records written to the OS but not yet fsynced
    uncommitted: usize,
    records_written: u64,
}

impl WalWriter {
    /// Open or create a WAL file in append mode
    pub fn open(path: &Path, discipline: Discipline, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        tracing::debug!(path = %path.display(), %discipline, len, "WAL opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            len,
            discipline,
            sync_strategy,
            uncommitted: 0,
            records_written: 0,
        })
    }

    /// Append a record to the WAL
    ///
    /// The record is handed to the OS before this returns. Any failure,
    /// including a closed handle, is reported as [`QuillError::WalWrite`],
    /// the file is cut back to its length before the call, and the caller
    /// must not apply the operation.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let line = codec::encode(record);

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| QuillError::WalWrite(format!("log '{}' is closed", self.path.display())))?;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted + 1 >= count,
        };

        let written = file.write_all(line.as_bytes()).and_then(|()| {
            if should_sync {
                file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            if let Err(rollback) = file.set_len(self.len) {
                tracing::warn!(
                    path = %self.path.display(),
                    len = self.len,
                    error = %rollback,
                    "Could not roll back failed WAL append"
                );
            }
            return Err(QuillError::WalWrite(e.to_string()));
        }

        self.len += line.len() as u64;
        self.records_written += 1;
        self.uncommitted = if should_sync { 0 } else { self.uncommitted + 1 };
        tracing::debug!(record = line.trim_end(), "WAL append");

        Ok(())
    }

    /// Log the intent to perform `operation`
    ///
    /// Writes a `TASK` record under the simple discipline and a `START`
    /// record under durable-ack. Returns the record that was written.
    pub fn begin(&mut self, operation: Operation, now: DateTime<Utc>) -> Result<LogRecord> {
        let phase = match self.discipline {
            Discipline::Simple => Phase::Task,
            Discipline::DurableAck => Phase::Start,
        };
        let record = LogRecord::new(now, phase, operation);
        self.append(&record)?;
        Ok(record)
    }

    /// Mark a previously started operation as durably complete
    ///
    /// No-op under the simple discipline.
    pub fn acknowledge(&mut self, started: &LogRecord, now: DateTime<Utc>) -> Result<()> {
        match self.discipline {
            Discipline::Simple => Ok(()),
            Discipline::DurableAck => self.append(&started.with_phase(Phase::Success, now)),
        }
    }

    /// Read every well-formed record from the start of the log
    ///
    /// Each call re-reads the file.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        WalReader::open(&self.path)?.read_all()
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_ref() {
            file.sync_data()?;
        }
        self.uncommitted = 0;
        Ok(())
    }

    /// Sync and release the file handle
    ///
    /// Closing twice is harmless.
    pub fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            tracing::debug!(path = %self.path.display(), "WAL already closed");
            return Ok(());
        }
        let result = self.sync();
        self.file = None;
        tracing::debug!(path = %self.path.display(), "WAL closed");
        result
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Records appended but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Records appended through this handle
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}
