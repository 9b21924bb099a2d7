//! Database module for SQLite storage
//!
//! Every worker owns a [`SqliteStore`] connection and feeds it through a
//! [`BatchCommitter`]. The connections share one WAL-mode database file and
//! take turns holding the write lock, one batch at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              Worker Threads (N)                      │
//! │  - Classify entries pulled from the queue            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ append(entry)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │         BatchCommitter (one per worker)              │
//! │  - Buffer K appends, then BEGIN IMMEDIATE            │
//! │  - Insert the batch, COMMIT, retry when busy         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │          SQLite file (WAL, short busy timeout)       │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod committer;
pub mod schema;
pub mod store;

pub use committer::{BatchCommitter, CommitSettings, CommitStats, LOCK_POLL_INTERVAL};
pub use schema::{create_indexes, keys, optimize_for_reads, provision};
pub use store::{EntryStore, SqliteStore};
