//! Error types for calyx
//!
//! This module defines the error hierarchy for the scanner:
//! - Traversal errors raised by the walker
//! - Classification errors (never fatal, recorded per entry)
//! - SQLite store and transaction errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the path or worker involved
//! - Preserve error chains for debugging

use rusqlite::ErrorCode;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for a scan
#[derive(Error, Debug)]
pub enum ScanError {
    /// Traversal errors
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Filesystem traversal errors
#[derive(Error, Debug)]
pub enum WalkError {
    /// The scan root exists but is not a directory
    #[error("Root path '{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// The scan root could not be stat'ed
    #[error("Cannot read root path '{path}': {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    /// Listing a directory failed
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed { path: PathBuf, source: io::Error },

    /// Stat of a directory child failed
    #[error("Failed to stat '{path}': {source}")]
    StatFailed { path: PathBuf, source: io::Error },

    /// Every consumer of the handoff queue is gone
    #[error("Handoff queue closed: no workers left to receive entries")]
    QueueClosed,
}

/// Content classification errors
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Could not stat the path
    #[error("Failed to stat '{path}': {source}")]
    Stat { path: PathBuf, source: io::Error },

    /// Could not read the file header
    #[error("Failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The external classifier could not be run or reported failure
    #[error("Classifier command failed for '{path}': {reason}")]
    Command { path: PathBuf, reason: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create database file
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// The engine rolled back the open transaction on its own
    #[error("Transaction was aborted by the database: {0}")]
    TransactionAborted(String),

    /// Commit still failing after retries
    #[error("Commit failed after {attempts} attempts: {reason}")]
    CommitFailed { attempts: u32, reason: String },

    /// The write lock stayed with other connections for too long
    #[error("Database is locked: no write lock after {waited:?}")]
    Locked { waited: Duration },

    /// An upsert run needs unique paths, but earlier rows repeat some
    #[error("{count} paths appear more than once in file_info; rescan with --mode replace")]
    DuplicatePaths { count: u64 },
}

impl DbError {
    /// Check if retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Check if this error leaves the store unusable for the current batch
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::TransactionAborted(_) | DbError::CommitFailed { .. }
        )
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Scan root missing or not a directory
    #[error("Invalid root path '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid commit interval
    #[error("Invalid commit interval {size}: must be between {min} and {max}")]
    InvalidCommitInterval { size: usize, min: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Worker lost its store and stopped
    #[error("Worker {id} store error: {source}")]
    Store { id: usize, source: DbError },
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Result type alias for WalkError
pub type WalkResult<T> = std::result::Result<T, WalkError>;
