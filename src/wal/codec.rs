//! Log line codec
//!
//! Maps a [`LogRecord`] to one newline-terminated line of text and back.
//!
//! ## Line Format
//! ```text
//! [Timestamp: <rfc3339>] [Task] [START|SUCCESS] <OP> <key> <value> with TTL <n> seconds
//! ```
//! - The phase token is omitted for single-phase (`TASK`) records
//! - `CLEAR`, `DROP` and `INIT` carry no key
//! - `INCR` may carry the value before the increment
//! - Keys and values are escaped into single tokens (see [`escape_token`])

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{QuillError, Result};
use super::{LogRecord, Operation, OperationKind, Phase};

const TIMESTAMP_PREFIX: &str = "[Timestamp: ";
const TASK_TAG: &str = "[Task] ";
const START_TAG: &str = "[START] ";
const SUCCESS_TAG: &str = "[SUCCESS] ";

/// Marker for the empty string, which would otherwise vanish between separators
const EMPTY_TOKEN: &str = "\\e";

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record as a single line, including the trailing newline
pub fn encode(record: &LogRecord) -> String {
    let mut line = String::with_capacity(96);
    line.push_str(TIMESTAMP_PREFIX);
    line.push_str(&record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true));
    line.push_str("] ");
    line.push_str(TASK_TAG);

    match record.phase {
        Phase::Task => {}
        Phase::Start => line.push_str(START_TAG),
        Phase::Success => line.push_str(SUCCESS_TAG),
    }

    line.push_str(record.operation.kind().as_str());

    match &record.operation {
        Operation::Set { key, value, ttl_seconds } => {
            push_token(&mut line, key);
            push_token(&mut line, value);
            if let Some(ttl) = ttl_seconds {
                line.push_str(&format!(" with TTL {} seconds", ttl));
            }
        }
        Operation::Delete { key } => push_token(&mut line, key),
        Operation::Incr { key, prior } => {
            push_token(&mut line, key);
            if let Some(prior) = prior {
                push_token(&mut line, prior);
            }
        }
        Operation::Init | Operation::Clear | Operation::Drop => {}
    }

    line.push('\n');
    line
}

fn push_token(line: &mut String, raw: &str) {
    line.push(' ');
    line.push_str(&escape_token(raw));
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one line (trailing newline optional)
///
/// Accepts both the single-phase form (no phase token) and the two-phase
/// form. Any deviation is a [`QuillError::WalParse`] with line number 0;
/// readers replace it with the real position.
pub fn decode(line: &str) -> Result<LogRecord> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let rest = line
        .strip_prefix(TIMESTAMP_PREFIX)
        .ok_or_else(|| malformed("missing timestamp"))?;
    let (stamp, rest) = rest
        .split_once("] ")
        .ok_or_else(|| malformed("unterminated timestamp"))?;
    let timestamp = DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| malformed(format!("bad timestamp '{}': {}", stamp, e)))?
        .with_timezone(&Utc);

    let rest = rest
        .strip_prefix(TASK_TAG)
        .ok_or_else(|| malformed("missing [Task] tag"))?;

    let (phase, rest) = if let Some(rest) = rest.strip_prefix(START_TAG) {
        (Phase::Start, rest)
    } else if let Some(rest) = rest.strip_prefix(SUCCESS_TAG) {
        (Phase::Success, rest)
    } else {
        (Phase::Task, rest)
    };

    let tokens: Vec<&str> = rest.split(' ').collect();
    let kind = OperationKind::parse(tokens[0])
        .ok_or_else(|| malformed(format!("unknown operation '{}'", tokens[0])))?;
    let args = &tokens[1..];

    let operation = match kind {
        OperationKind::Init | OperationKind::Clear | OperationKind::Drop => {
            if !args.is_empty() {
                return Err(malformed(format!("{} takes no arguments", kind)));
            }
            match kind {
                OperationKind::Init => Operation::Init,
                OperationKind::Clear => Operation::Clear,
                _ => Operation::Drop,
            }
        }
        OperationKind::Delete => match args {
            [key] => Operation::Delete { key: unescape_token(key)? },
            _ => return Err(malformed("DELETE expects exactly one key")),
        },
        OperationKind::Incr => match args {
            [key] => Operation::Incr {
                key: unescape_token(key)?,
                prior: None,
            },
            [key, prior] => Operation::Incr {
                key: unescape_token(key)?,
                prior: Some(unescape_token(prior)?),
            },
            _ => return Err(malformed("INCR expects a key and an optional prior value")),
        },
        OperationKind::Set => match args {
            [key, value] => Operation::Set {
                key: unescape_token(key)?,
                value: unescape_token(value)?,
                ttl_seconds: None,
            },
            [key, value, "with", "TTL", ttl, "seconds"] => Operation::Set {
                key: unescape_token(key)?,
                value: unescape_token(value)?,
                ttl_seconds: Some(
                    ttl.parse()
                        .map_err(|_| malformed(format!("bad TTL '{}'", ttl)))?,
                ),
            },
            _ => return Err(malformed("SET expects a key, a value and an optional TTL clause")),
        },
    };

    if let Some(key) = operation.key() {
        if key.is_empty() {
            return Err(malformed("empty key"));
        }
    }

    Ok(LogRecord::new(timestamp, phase, operation))
}

fn malformed(reason: impl Into<String>) -> QuillError {
    QuillError::parse(0, reason)
}

// =============================================================================
// Token Escaping
// =============================================================================

/// Escape an arbitrary string into a token free of spaces and line breaks
pub fn escape_token(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY_TOKEN.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_token`]
pub fn unescape_token(token: &str) -> Result<String> {
    if token == EMPTY_TOKEN {
        return Ok(String::new());
    }
    if token.is_empty() {
        return Err(malformed("empty token"));
    }

    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => return Err(malformed(format!("invalid escape '\\{}'", other))),
            None => return Err(malformed("dangling escape")),
        }
    }
    Ok(out)
}
