//! Configuration for QuillKV
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{QuillError, Result};

/// Main configuration for a QuillKV store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the store's files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {name}.log                 (write-ahead log)
    ///     └── {name}.db | .json | .bin   (snapshot)
    pub data_dir: PathBuf,

    /// Store name; every file of the store is derived from it
    pub name: String,

    /// Encoding used for full snapshots
    pub snapshot_format: SnapshotFormat,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Logging discipline, fixed for the lifetime of the store
    pub discipline: Discipline,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,
}

/// How mutations are recorded in the WAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    /// One `TASK` record per mutation; every task is replayed on open
    #[default]
    Simple,

    /// `START` before the mutation, `SUCCESS` once the snapshot is durable;
    /// only unmatched starts are replayed on open
    DurableAck,
}

/// Snapshot encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    /// One escaped `key value expiry` line per entry
    #[default]
    Text,

    /// Pretty-printed JSON object
    Json,

    /// bincode payload behind a checksummed header
    Binary,
}

/// WAL sync strategy
///
/// Records are always flushed to the OS before `append` returns; the
/// strategy only controls how often the file is fsynced.
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./quillkv_data"),
            name: "default".to_string(),
            snapshot_format: SnapshotFormat::Text,
            discipline: Discipline::Simple,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Path of the write-ahead log (`<name>.log`)
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.log", self.name))
    }

    /// Path of the snapshot file for the configured format
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", self.name, self.snapshot_format.extension()))
    }

    /// Check that the store name can be turned into file names
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QuillError::Config("store name must not be empty".to_string()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(QuillError::Config(format!(
                "store name '{}' must not contain path components",
                self.name
            )));
        }
        Ok(())
    }
}

impl SnapshotFormat {
    /// File extension used for this format
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Text => "db",
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "bin",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(SnapshotFormat::Text),
            "json" => Ok(SnapshotFormat::Json),
            "binary" | "bin" => Ok(SnapshotFormat::Binary),
            other => Err(QuillError::Config(format!("unknown snapshot format '{}'", other))),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotFormat::Text => "text",
            SnapshotFormat::Json => "json",
            SnapshotFormat::Binary => "binary",
        };
        f.write_str(name)
    }
}

impl FromStr for Discipline {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Discipline::Simple),
            "durable-ack" | "durable" | "two-phase" => Ok(Discipline::DurableAck),
            other => Err(QuillError::Config(format!("unknown WAL discipline '{}'", other))),
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Simple => f.write_str("simple"),
            Discipline::DurableAck => f.write_str("durable-ack"),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the store name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the snapshot encoding
    pub fn snapshot_format(mut self, format: SnapshotFormat) -> Self {
        self.config.snapshot_format = format;
        self
    }

    /// Set the WAL discipline
    pub fn discipline(mut self, discipline: Discipline) -> Self {
        self.config.discipline = discipline;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
