//! Storage Module
//!
//! Full-state snapshots of the keyspace.
//!
//! ## Responsibilities
//! - Persist the whole keyspace after every successful mutation
//! - Load the last persisted keyspace on open (missing file = empty)
//! - Remove the snapshot when the store is dropped
//!
//! Every backend writes to a temporary file and renames it over the old
//! snapshot, so a crash leaves either the old or the new snapshot.
//!
//! ## Formats
//! ```text
//! text    key value expiry            one escaped line per entry
//! json    { "key": { "value": .., "expires_at": .. } }
//! binary  ┌──────────┬──────────┬─────────┬─────────┬──────────────┐
//!         │Magic (4) │Version(2)│ CRC (4) │ Len (8) │ bincode data │
//!         └──────────┴──────────┴─────────┴─────────┴──────────────┘
//! ```

mod atomic;
mod binary;
mod json;
mod text;

pub use binary::BinaryBackend;
pub use json::JsonBackend;
pub use text::TextBackend;

use std::path::Path;

use crate::config::{Config, SnapshotFormat};
use crate::error::Result;
use crate::keyspace::Keyspace;

/// Where and how the keyspace is persisted
///
/// The store engine is generic over this trait; the encoding is chosen once
/// when the store is constructed.
pub trait SnapshotBackend: Send {
    /// Replace the stored snapshot with `keyspace`, all-or-nothing
    fn persist(&self, keyspace: &Keyspace) -> Result<()>;

    /// Load the stored snapshot; an absent snapshot is an empty keyspace
    fn load(&self) -> Result<Keyspace>;

    /// Delete the stored snapshot; an absent snapshot is not an error
    fn remove(&self) -> Result<()>;

    /// Location of the snapshot file
    fn path(&self) -> &Path;
}

impl<B: SnapshotBackend + ?Sized> SnapshotBackend for Box<B> {
    fn persist(&self, keyspace: &Keyspace) -> Result<()> {
        (**self).persist(keyspace)
    }

    fn load(&self) -> Result<Keyspace> {
        (**self).load()
    }

    fn remove(&self) -> Result<()> {
        (**self).remove()
    }

    fn path(&self) -> &Path {
        (**self).path()
    }
}

/// Build the backend selected by `config.snapshot_format`
pub fn backend_for(config: &Config) -> Box<dyn SnapshotBackend> {
    let path = config.snapshot_path();
    match config.snapshot_format {
        SnapshotFormat::Text => Box::new(TextBackend::new(path)),
        SnapshotFormat::Json => Box::new(JsonBackend::new(path)),
        SnapshotFormat::Binary => Box::new(BinaryBackend::new(path)),
    }
}
