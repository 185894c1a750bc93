//! Keyspace Module
//!
//! The in-memory key-value map with per-key expiry.
//!
//! ## Responsibilities
//! - Point lookups, inserts and removals by string key
//! - Track an optional expiry instant per key
//! - Report which keys have expired at a given instant
//!
//! ## Data Structure Choice
//! A plain BTreeMap: the store is single-writer and ordered iteration
//! keeps snapshot files stable between writes.

mod table;

pub use table::Keyspace;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A value stored in the keyspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The stored value
    pub value: String,

    /// When the key stops being visible (`None` = never)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// An entry that never expires
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// An entry is expired once `now` reaches its expiry instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Parse a stored value as an integer and add one
///
/// Returns `None` if the value is not an `i64` or the increment overflows.
pub fn increment(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()?.checked_add(1)
}

/// Expiry instant for a TTL counted from `start`
///
/// A TTL too large to represent never expires.
pub fn expiry_after(start: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| start.checked_add_signed(ttl))
}
