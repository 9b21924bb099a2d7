//! calyx - Parallel Filesystem Classifier
//!
//! Walks a directory tree, describes the content of every entry and records
//! the results in SQLite for later analysis.
//!
//! # Features
//!
//! - **Content Classification**: Each entry gets a `file(1)`-style
//!   description, either from built-in magic-byte detection or from an
//!   external `file` binary.
//!
//! - **Parallel Workers**: Classification runs on N worker threads, each
//!   with its own database connection.
//!
//! - **Memory Efficient**: Bounded handoff queue with backpressure keeps the
//!   walker from running ahead of the workers.
//!
//! - **SQLite Output**: Batched transactions in WAL mode, with replace,
//!   upsert and append write modes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Local Filesystem                            │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ read_dir + lstat
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Walker (driver thread, BFS)                    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!            ┌──────────────────────────────────────┐
//!            │           Entry Queue                │
//!            │  (crossbeam bounded, backpressure)   │
//!            └──────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────▼───────────────────────────────────┐
//! │                      Worker Threads                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  │classify │  │classify │  │classify │         │classify │      │
//! │  │ commit  │  │ commit  │  │ commit  │         │ commit  │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! └───────┼────────────┼────────────┼────────────────────┼──────────┘
//!         └────────────┴─────┬──────┴────────────────────┘
//!                            ▼
//!                 ┌──────────────────┐
//!                 │   SQLite DB      │
//!                 │   (calyx.db)     │
//!                 └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Basic scan
//! calyx /data -o data.db
//!
//! # Keep earlier rows, replacing those with the same path
//! calyx /data -w 16 --mode upsert -o data.db
//!
//! # Query results
//! sqlite3 data.db "SELECT short_classification, COUNT(*) FROM file_info GROUP BY 1"
//! ```

pub mod classify;
pub mod config;
pub mod db;
pub mod entry;
pub mod error;
pub mod progress;
pub mod walker;

pub use classify::{Classifier, FileCommandClassifier, MagicClassifier};
pub use config::{ClassifierKind, CliArgs, ScanConfig, WriteMode};
pub use entry::{EntryType, FilesystemEntry};
pub use error::{Result, ScanError};
pub use walker::{ScanCoordinator, ScanProgress, ScanResult};
