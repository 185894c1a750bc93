//! WAL record definitions
//!
//! Defines the structure of individual WAL log records.

use std::fmt;

use chrono::{DateTime, Utc};

/// A single record in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,

    /// Where in the operation's lifecycle the record was written
    pub phase: Phase,

    /// The operation being logged
    pub operation: Operation,
}

/// Lifecycle marker of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Single-phase record (simple discipline)
    Task,

    /// Written before the mutation (durable-ack discipline)
    Start,

    /// Written once the mutation's snapshot is durable (durable-ack discipline)
    Success,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Store opened; never replayed
    Init,

    /// Insert or overwrite a key
    Set {
        key: String,
        value: String,
        ttl_seconds: Option<u64>,
    },

    /// Remove a key
    Delete { key: String },

    /// Remove every key
    Clear,

    /// Increment an integer value; `prior` is the value before the increment
    Incr { key: String, prior: Option<String> },

    /// Remove the store and its files
    Drop,
}

/// Operation name as written in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Init,
    Set,
    Delete,
    Clear,
    Incr,
    Drop,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Utc>, phase: Phase, operation: Operation) -> Self {
        Self {
            timestamp,
            phase,
            operation,
        }
    }

    /// Copy of this record marked with another phase
    pub fn with_phase(&self, phase: Phase, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            phase,
            operation: self.operation.clone(),
        }
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Init => OperationKind::Init,
            Operation::Set { .. } => OperationKind::Set,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Clear => OperationKind::Clear,
            Operation::Incr { .. } => OperationKind::Incr,
            Operation::Drop => OperationKind::Drop,
        }
    }

    /// Key the operation touches, if it is a point operation
    pub fn key(&self) -> Option<&str> {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } | Operation::Incr { key, .. } => {
                Some(key)
            }
            Operation::Init | Operation::Clear | Operation::Drop => None,
        }
    }
}

impl OperationKind {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Init => "INIT",
            OperationKind::Set => "SET",
            OperationKind::Delete => "DELETE",
            OperationKind::Clear => "CLEAR",
            OperationKind::Incr => "INCR",
            OperationKind::Drop => "DROP",
        }
    }

    /// Case-insensitive lookup
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INIT" => Some(OperationKind::Init),
            "SET" => Some(OperationKind::Set),
            "DELETE" => Some(OperationKind::Delete),
            "CLEAR" => Some(OperationKind::Clear),
            "INCR" => Some(OperationKind::Incr),
            "DROP" => Some(OperationKind::Drop),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Task => f.write_str("TASK"),
            Phase::Start => f.write_str("START"),
            Phase::Success => f.write_str("SUCCESS"),
        }
    }
}
