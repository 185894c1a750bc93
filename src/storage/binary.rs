//! Binary snapshots
//!
//! A fixed header followed by the bincode-encoded entries. The CRC covers
//! the payload so a damaged file is reported instead of half-loaded.

use std::path::{Path, PathBuf};

use crate::error::{QuillError, Result};
use crate::keyspace::{Entry, Keyspace};
use super::{atomic, SnapshotBackend};

/// Magic bytes: "QKVS"
pub const MAGIC: &[u8; 4] = b"QKVS";

/// Binary snapshot format version
pub const VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + crc (4) + payload length (8)
pub const HEADER_SIZE: usize = 18;

/// bincode snapshot backend
#[derive(Debug, Clone)]
pub struct BinaryBackend {
    path: PathBuf,
}

impl BinaryBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn corrupt(&self, reason: impl std::fmt::Display) -> QuillError {
        QuillError::Snapshot(format!("{}: {}", self.path.display(), reason))
    }
}

impl SnapshotBackend for BinaryBackend {
    fn persist(&self, keyspace: &Keyspace) -> Result<()> {
        let entries: Vec<(&String, &Entry)> = keyspace.iter().collect();
        let payload =
            bincode::serialize(&entries).map_err(|e| QuillError::Serialization(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&payload);

        atomic::write_atomic(&self.path, &bytes)
    }

    fn load(&self) -> Result<Keyspace> {
        let Some(bytes) = atomic::read_optional(&self.path)? else {
            return Ok(Keyspace::new());
        };
        if bytes.len() < HEADER_SIZE {
            return Err(self.corrupt("file shorter than header"));
        }

        let (header, payload) = bytes.split_at(HEADER_SIZE);
        if &header[0..4] != MAGIC {
            return Err(self.corrupt("bad magic"));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(self.corrupt(format!("unsupported version {}", version)));
        }

        let expected_crc = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[10..18]);
        let len = u64::from_le_bytes(len_bytes);

        if payload.len() as u64 != len {
            return Err(self.corrupt(format!(
                "payload length {} does not match header {}",
                payload.len(),
                len
            )));
        }
        if crc32fast::hash(payload) != expected_crc {
            return Err(self.corrupt("checksum mismatch"));
        }

        let entries: Vec<(String, Entry)> =
            bincode::deserialize(payload).map_err(|e| self.corrupt(e))?;
        Ok(entries.into_iter().collect())
    }

    fn remove(&self) -> Result<()> {
        atomic::remove_if_exists(&self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
