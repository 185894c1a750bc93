//! # QuillKV
//!
//! An embeddable, single-process key-value store with:
//! - Write-Ahead Logging (WAL) in two disciplines: single-phase tasks or
//!   START/SUCCESS pairs
//! - Crash recovery that replays only what did not durably complete
//! - Per-key time-to-live with lazy expiry
//! - Full snapshots in text, JSON or binary form
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Store (engine)                        │
//! │          set / incr / get / delete / exists / clear / drop   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌───────────────┐
//!   │     WAL     │ │  Keyspace   │   │   Snapshot    │
//!   │  (Append)   │ │ (BTreeMap)  │   │   Backend     │
//!   └──────┬──────┘ └─────────────┘   └───────┬───────┘
//!          │                                  │
//!          └──────────► Recovery ◄────────────┘
//!                      (on open)
//! ```
//!
//! A store is owned by one caller at a time; wrap it in a lock to share it.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod wal;
pub mod keyspace;
pub mod storage;
pub mod recovery;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QuillError, Result};
pub use config::{Config, Discipline, SnapshotFormat, WalSyncStrategy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, Reply};
pub use engine::Store;
pub use recovery::RecoveryReport;
pub use storage::SnapshotBackend;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of QuillKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
