//! Per-worker batch committer
//!
//! Each worker appends its classified entries here. Entries are buffered
//! until `interval` of them are pending, then written in one short burst:
//! open a transaction, insert every row, commit. The write lock is held
//! only for the burst, so N workers sharing one SQLite file take turns
//! instead of one of them holding the lock while it classifies.
//!
//! # Failure handling
//!
//! - A failed insert is logged and counted; the batch carries on.
//! - A busy/locked `begin` keeps waiting until `lock_wait` has passed, then
//!   fails with [`DbError::Locked`]. Once shutdown is requested the wait is
//!   cut to at most `shutdown_grace`.
//! - A busy/locked commit is retried with linear backoff, then fatal.
//! - Any other failure to open the transaction is fatal.

use crate::db::store::EntryStore;
use crate::entry::FilesystemEntry;
use crate::error::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Busy timeout of worker connections; one `begin` attempt waits this long
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Commit behaviour shared by all workers
#[derive(Debug, Clone, Copy)]
pub struct CommitSettings {
    /// Appends per transaction
    pub interval: usize,

    /// Extra attempts for a busy commit
    pub retries: u32,

    /// Delay before the first retry; grows linearly
    pub retry_backoff: Duration,

    /// How long a batch may wait for the write lock
    pub lock_wait: Duration,

    /// Remaining lock wait once shutdown is requested
    pub shutdown_grace: Duration,
}

/// Statistics about committed work
#[derive(Debug, Default)]
pub struct CommitStats {
    /// Rows inside successfully committed transactions
    pub rows_committed: AtomicU64,

    /// Inserts that failed and were skipped
    pub insert_failures: AtomicU64,

    /// Transactions committed
    pub transactions_committed: AtomicU64,

    /// Begin or commit attempts repeated after a busy error
    pub commit_retries: AtomicU64,
}

impl CommitStats {
    pub fn rows_committed(&self) -> u64 {
        self.rows_committed.load(Ordering::Relaxed)
    }

    pub fn insert_failures(&self) -> u64 {
        self.insert_failures.load(Ordering::Relaxed)
    }

    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    pub fn commit_retries(&self) -> u64 {
        self.commit_retries.load(Ordering::Relaxed)
    }
}

/// Batches appends into short, periodically committed transactions
pub struct BatchCommitter<S: EntryStore> {
    store: S,
    settings: CommitSettings,

    /// Entries waiting for the next burst
    batch: Vec<FilesystemEntry>,

    shutdown: Arc<AtomicBool>,
    stats: Arc<CommitStats>,
}

impl<S: EntryStore> BatchCommitter<S> {
    pub fn new(store: S, settings: CommitSettings) -> Self {
        Self::with_stats(store, settings, Arc::new(CommitStats::default()))
    }

    /// Create a committer reporting into existing statistics
    pub fn with_stats(store: S, settings: CommitSettings, stats: Arc<CommitStats>) -> Self {
        Self {
            store,
            settings,
            batch: Vec::with_capacity(settings.interval),
            shutdown: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    /// Shorten lock waits once `shutdown` is set
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get committer statistics
    pub fn stats(&self) -> Arc<CommitStats> {
        Arc::clone(&self.stats)
    }

    /// Appends not yet committed
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Add one entry to the current batch, writing the batch once it is full
    ///
    /// Returns an error only when the store can no longer make progress.
    pub fn append(&mut self, entry: FilesystemEntry) -> DbResult<()> {
        self.batch.push(entry);
        if self.batch.len() >= self.settings.interval {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the in-flight partial batch, if any
    pub fn finish(mut self) -> DbResult<()> {
        if !self.batch.is_empty() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> DbResult<()> {
        let batch = std::mem::take(&mut self.batch);
        if let Err(e) = self.acquire() {
            warn!(dropped = batch.len(), error = %e, "Could not open a transaction");
            return Err(e);
        }

        let mut rows = 0u64;
        for entry in &batch {
            match self.store.insert(entry) {
                Ok(()) => rows += 1,
                Err(e) if e.is_fatal() => {
                    self.discard();
                    return Err(e);
                }
                Err(e) => {
                    self.stats.insert_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %entry.path().display(), error = %e, "Failed to insert entry");
                }
            }
        }

        self.commit()?;

        self.stats.rows_committed.fetch_add(rows, Ordering::Relaxed);
        self.stats
            .transactions_committed
            .fetch_add(1, Ordering::Relaxed);
        debug!(rows = rows, appended = batch.len(), "Batch committed");

        self.batch = batch;
        self.batch.clear();
        Ok(())
    }

    /// Open a transaction, waiting for other workers to release the lock
    fn acquire(&mut self) -> DbResult<()> {
        let started = Instant::now();
        // None only when lock_wait is too large to represent
        let mut deadline = started.checked_add(self.settings.lock_wait);
        let mut shutdown_seen = false;

        loop {
            let e = match self.store.begin() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            let now = Instant::now();
            if !shutdown_seen && self.shutdown.load(Ordering::Relaxed) {
                shutdown_seen = true;
                let grace = now + self.settings.shutdown_grace;
                deadline = Some(deadline.map_or(grace, |d| d.min(grace)));
            }

            let waited = now - started;
            if deadline.is_some_and(|d| now >= d) {
                return Err(DbError::Locked { waited });
            }

            self.stats.commit_retries.fetch_add(1, Ordering::Relaxed);
            debug!(waited_ms = waited.as_millis() as u64, error = %e, "Waiting for write lock");
            thread::yield_now();
        }
    }

    fn commit(&mut self) -> DbResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.store.commit() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.settings.retries => {
                    attempt += 1;
                    self.stats.commit_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt = attempt, error = %e, "Commit busy, retrying");
                    thread::sleep(self.settings.retry_backoff * attempt);
                }
                Err(e) => {
                    self.discard();
                    return Err(DbError::CommitFailed {
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn discard(&mut self) {
        if let Err(e) = self.store.rollback() {
            warn!(error = %e, "Rollback failed");
        }
    }
}
