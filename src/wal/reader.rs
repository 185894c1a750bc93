//! WAL Reader
//!
//! Reads records from the start of a WAL file, stopping at the first line
//! that is incomplete or cannot be decoded.
//!
//! A bad line with nothing but blank lines after it is a torn tail, the
//! remains of an interrupted append. A bad line followed by more content is
//! corruption inside the log; the records after it are kept on disk but
//! not read.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{QuillError, Result};
use super::{codec, LogRecord};

/// Reads records from a WAL file
pub struct WalReader {
    /// `None` when the log does not exist
    reader: Option<BufReader<File>>,
    /// Bytes covered by the lines read so far
    position: u64,
    /// Byte length of the well-formed prefix
    valid_len: u64,
    line_no: usize,
    finished: bool,
    /// Why reading stopped early, if it did
    stop_reason: Option<QuillError>,
    /// Non-blank content follows the line that stopped reading
    content_after_stop: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    ///
    /// A missing file reads as an empty log.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = match File::open(path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            reader,
            position: 0,
            valid_len: 0,
            line_no: 0,
            finished: false,
            stop_reason: None,
            content_after_stop: false,
        })
    }

    /// Read the next record from the WAL
    ///
    /// Returns `Ok(None)` at the end of the usable log: end of file, a
    /// torn final line, or a malformed line. Only I/O failures are errors.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                self.finished = true;
                return Ok(None);
            };

            let mut buf = Vec::new();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                self.finished = true;
                return Ok(None);
            }
            self.position += read as u64;
            self.line_no += 1;

            if buf.last() != Some(&b'\n') {
                self.stop(QuillError::parse(self.line_no, "incomplete final line"));
                return Ok(None);
            }

            let decoded = std::str::from_utf8(&buf)
                .map_err(|_| QuillError::parse(self.line_no, "line is not valid UTF-8"))
                .and_then(|line| {
                    if line.trim().is_empty() {
                        return Ok(None);
                    }
                    codec::decode(line).map(Some).map_err(|e| self.relabel(e))
                });

            match decoded {
                Ok(Some(record)) => {
                    self.valid_len = self.position;
                    return Ok(Some(record));
                }
                // Blank line: harmless, keep going
                Ok(None) => self.valid_len = self.position,
                Err(e) => {
                    self.content_after_stop = self.rest_has_content()?;
                    self.stop(e);
                    return Ok(None);
                }
            }
        }
    }

    /// Read every remaining well-formed record
    pub fn read_all(mut self) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Iterate over all valid records
    pub fn records(self) -> WalIterator {
        WalIterator { reader: self }
    }

    /// Byte length of the well-formed prefix read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Whether reading stopped before the end of the file
    pub fn was_truncated(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// The parse error that ended the usable log, if any
    pub fn stop_reason(&self) -> Option<&QuillError> {
        self.stop_reason.as_ref()
    }

    /// Whether reading stopped at a torn final line
    ///
    /// Only a torn tail may be cut off; anything past `valid_len` is then
    /// garbage from an interrupted append.
    pub fn stopped_at_tail(&self) -> bool {
        self.stop_reason.is_some() && !self.content_after_stop
    }

    /// Whether reading stopped at a bad line with more records after it
    pub fn stopped_mid_log(&self) -> bool {
        self.stop_reason.is_some() && self.content_after_stop
    }

    fn stop(&mut self, reason: QuillError) {
        tracing::warn!(
            %reason,
            valid_len = self.valid_len,
            mid_log = self.content_after_stop,
            "WAL replay stops at unusable line"
        );
        self.finished = true;
        self.stop_reason = Some(reason);
    }

    /// Drain the rest of the file, reporting whether any of it is not blank
    fn rest_has_content(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        Ok(!rest.iter().all(u8::is_ascii_whitespace))
    }

    fn relabel(&self, error: QuillError) -> QuillError {
        match error {
            QuillError::WalParse { reason, .. } => QuillError::parse(self.line_no, reason),
            other => other,
        }
    }
}

/// Iterator over WAL records
pub struct WalIterator {
    reader: WalReader,
}

impl WalIterator {
    /// Access the underlying reader (e.g. to inspect the stop reason)
    pub fn reader(&self) -> &WalReader {
        &self.reader
    }
}

impl Iterator for WalIterator {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}
