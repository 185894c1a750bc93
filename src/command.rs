//! Command surface
//!
//! Text commands accepted by the shell, one per line:
//!
//! ```text
//! set <key> <value> [ttl-seconds]
//! incr <key>
//! get <key>
//! delete <key>
//! exists <key>
//! clear
//! drop
//! ```
//!
//! Command names are case-insensitive; keys and values are taken verbatim.

use std::fmt;
use std::str::FromStr;

use crate::error::{QuillError, Result};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert or overwrite a key, optionally with a TTL in seconds
    Set {
        key: String,
        value: String,
        ttl: Option<u64>,
    },

    /// Increment an integer value
    Incr { key: String },

    /// Get a value by key
    Get { key: String },

    /// Delete a key
    Delete { key: String },

    /// Check whether a key exists
    Exists { key: String },

    /// Remove every key
    Clear,

    /// Delete the store and its files
    Drop,
}

impl Command {
    /// Parse one input line
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Err(QuillError::Command("empty input".to_string()));
        };

        let name = name.to_ascii_lowercase();
        let command = match (name.as_str(), args) {
            ("set", [key, value]) => Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                ttl: None,
            },
            ("set", [key, value, ttl]) => Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                ttl: Some(ttl.parse().map_err(|_| {
                    QuillError::Command(format!("TTL must be a whole number of seconds, got '{}'", ttl))
                })?),
            },
            ("incr", [key]) => Command::Incr { key: key.to_string() },
            ("get", [key]) => Command::Get { key: key.to_string() },
            ("delete" | "del", [key]) => Command::Delete { key: key.to_string() },
            ("exists", [key]) => Command::Exists { key: key.to_string() },
            ("clear", []) => Command::Clear,
            ("drop", []) => Command::Drop,
            ("set" | "incr" | "get" | "delete" | "del" | "exists" | "clear" | "drop", _) => {
                return Err(QuillError::Command(format!("wrong number of arguments for '{}'", name)))
            }
            (other, _) => return Err(QuillError::Command(format!("unknown command '{}'", other))),
        };
        Ok(command)
    }

    /// Command name as typed by the user
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Incr { .. } => "incr",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
            Command::Exists { .. } => "exists",
            Command::Clear => "clear",
            Command::Drop => "drop",
        }
    }
}

impl FromStr for Command {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command succeeded and returns nothing
    Ok,

    /// GET result
    Value(Option<String>),

    /// DELETE / EXISTS result
    Bool(bool),

    /// INCR result; `None` means the key could not be incremented
    Integer(Option<i64>),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("OK"),
            Reply::Value(Some(value)) => f.write_str(value),
            Reply::Value(None) => f.write_str("(nil)"),
            Reply::Bool(flag) => write!(f, "{}", flag),
            Reply::Integer(Some(n)) => write!(f, "{}", n),
            Reply::Integer(None) => f.write_str("(not incrementable)"),
        }
    }
}
