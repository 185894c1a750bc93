//! JSON snapshots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{QuillError, Result};
use crate::keyspace::{Entry, Keyspace};
use super::{atomic, SnapshotBackend};

/// JSON object snapshot backend: `{ "<key>": { "value": .., "expires_at": .. } }`
#[derive(Debug, Clone)]
pub struct JsonBackend {
    path: PathBuf,
}

impl JsonBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotBackend for JsonBackend {
    fn persist(&self, keyspace: &Keyspace) -> Result<()> {
        let image: BTreeMap<&str, &Entry> = keyspace
            .iter()
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();
        let bytes = serde_json::to_vec_pretty(&image)
            .map_err(|e| QuillError::Serialization(e.to_string()))?;
        atomic::write_atomic(&self.path, &bytes)
    }

    fn load(&self) -> Result<Keyspace> {
        let Some(bytes) = atomic::read_optional(&self.path)? else {
            return Ok(Keyspace::new());
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Keyspace::new());
        }
        let image: BTreeMap<String, Entry> = serde_json::from_slice(&bytes)
            .map_err(|e| QuillError::Snapshot(format!("{}: {}", self.path.display(), e)))?;
        Ok(image.into_iter().collect())
    }

    fn remove(&self) -> Result<()> {
        atomic::remove_if_exists(&self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
