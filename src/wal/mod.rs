//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a log record before any mutation
//! - Two disciplines: single-phase `TASK` records, or `START`/`SUCCESS` pairs
//! - Tolerate a torn or malformed tail on restart
//! - Compute the set of operations to replay
//!
//! ## File Format
//! ```text
//! [Timestamp: 2026-01-01T00:00:00.000000Z] [Task] SET k v            (simple)
//! [Timestamp: 2026-01-01T00:00:00.000000Z] [Task] [START] SET k v    (durable-ack)
//! [Timestamp: 2026-01-01T00:00:00.000100Z] [Task] [SUCCESS] SET k v
//! ```

pub mod codec;
mod record;
mod writer;
mod reader;
mod recovery;

pub use record::{LogRecord, Operation, OperationKind, Phase};
pub use writer::WalWriter;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
