//! Delimited text snapshots
//!
//! One line per entry: `<key> <value> <expiry>`, with key and value escaped
//! the same way as WAL tokens and `-` standing for "never expires".

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{QuillError, Result};
use crate::keyspace::{Entry, Keyspace};
use crate::wal::codec::{escape_token, unescape_token};
use super::{atomic, SnapshotBackend};

const NO_EXPIRY: &str = "-";

/// Plain text snapshot backend
#[derive(Debug, Clone)]
pub struct TextBackend {
    path: PathBuf,
}

impl TextBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn decode_line(&self, line_no: usize, line: &str) -> Result<(String, Entry)> {
        let corrupt = |reason: &str| {
            QuillError::Snapshot(format!(
                "{} line {}: {}",
                self.path.display(),
                line_no,
                reason
            ))
        };

        let fields: Vec<&str> = line.split(' ').collect();
        let [key, value, expiry] = fields.as_slice() else {
            return Err(corrupt("expected three fields"));
        };

        let key = unescape_token(key).map_err(|_| corrupt("bad key escape"))?;
        let value = unescape_token(value).map_err(|_| corrupt("bad value escape"))?;
        let expires_at = match *expiry {
            NO_EXPIRY => None,
            stamp => Some(
                DateTime::parse_from_rfc3339(stamp)
                    .map_err(|_| corrupt("bad expiry timestamp"))?
                    .with_timezone(&Utc),
            ),
        };

        Ok((key, Entry::with_expiry(value, expires_at)))
    }
}

impl SnapshotBackend for TextBackend {
    fn persist(&self, keyspace: &Keyspace) -> Result<()> {
        let mut out = String::new();
        for (key, entry) in keyspace {
            out.push_str(&escape_token(key));
            out.push(' ');
            out.push_str(&escape_token(&entry.value));
            out.push(' ');
            match entry.expires_at {
                Some(at) => out.push_str(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
                None => out.push_str(NO_EXPIRY),
            }
            out.push('\n');
        }
        atomic::write_atomic(&self.path, out.as_bytes())
    }

    fn load(&self) -> Result<Keyspace> {
        let Some(bytes) = atomic::read_optional(&self.path)? else {
            return Ok(Keyspace::new());
        };
        let text = String::from_utf8(bytes)
            .map_err(|_| QuillError::Snapshot(format!("{} is not UTF-8", self.path.display())))?;

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(i, line)| self.decode_line(i + 1, line))
            .collect()
    }

    fn remove(&self) -> Result<()> {
        atomic::remove_if_exists(&self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
