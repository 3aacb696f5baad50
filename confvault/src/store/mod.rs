//! Durable stores written by the execution core.
//!
//! - [`SnapshotWriter`]: versioned configuration snapshots ([`GitSnapshotStore`])
//! - [`LogWriter`]: append-only job and connection logs ([`SqliteLogStore`])

mod logs;
mod snapshot;

pub use logs::{LogEntry, LogKind, LogLevel, LogWriter, SqliteLogStore};
pub use snapshot::{GitSnapshotStore, SnapshotWriter, commit_message};
