//! Scan coordinator - orchestrates the walk and the worker pool
//!
//! The coordinator is responsible for:
//! - Provisioning the database and recording run metadata
//! - Opening one store per worker and spawning the workers
//! - Running the walker on the calling thread
//! - Progress reporting
//! - Joining workers and choosing the reported outcome
//!
//! A coordinator runs one scan; its counters are not reset between runs.

use crate::classify::Classifier;
use crate::config::ScanConfig;
use crate::db::schema::{self, keys, set_scan_info, SCHEMA_VERSION};
use crate::db::{EntryStore, SqliteStore, LOCK_POLL_INTERVAL};
use crate::error::{DbError, DbResult, Result, ScanError, WorkerError};
use crate::walker::queue;
use crate::walker::walk::{WalkStats, Walker};
use crate::walker::worker::{Worker, WorkerStats};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of a finished scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Directories emitted, root included
    pub total_dirs: u64,

    /// Regular files emitted
    pub total_files: u64,

    /// Other entries emitted (symlinks, devices, ...)
    pub total_other: u64,

    /// Sum of regular file sizes
    pub total_bytes: u64,

    /// Entries handed to the workers
    pub entries_emitted: u64,

    /// Entries classified and appended by the workers
    pub entries_processed: u64,

    /// Rows in committed transactions
    pub rows_committed: u64,

    /// Directories or children the walker skipped
    pub walk_errors: u64,

    /// Entries stored without a classification
    pub classify_failures: u64,

    /// Rows that failed to insert
    pub insert_failures: u64,

    /// Commits repeated after a busy error
    pub commit_retries: u64,

    /// Time taken for the scan
    pub duration: Duration,

    /// Whether the scan completed (vs was interrupted)
    pub completed: bool,
}

impl ScanResult {
    /// Calculate committed rows per second
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.rows_committed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Directories found
    pub dirs: u64,

    /// Files found
    pub files: u64,

    /// Bytes found
    pub bytes: u64,

    /// Entries classified by the workers
    pub entries_processed: u64,

    /// Rows committed so far
    pub rows_committed: u64,

    /// Walk errors plus failed classifications and inserts
    pub errors: u64,

    /// Total workers
    pub total_workers: usize,

    /// Elapsed time
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate classified entries per second
    pub fn entries_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.entries_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Outcome of the walk and worker phase, before it is reported
struct Execution {
    result: ScanResult,
    error: Option<ScanError>,
}

/// Coordinates the walker and the worker pool
pub struct ScanCoordinator {
    /// Configuration
    config: Arc<ScanConfig>,

    /// Classifier shared by all workers
    classifier: Arc<dyn Classifier>,

    /// Producer of entries
    walker: Walker,

    /// Statistics shared by all workers
    worker_stats: Arc<WorkerStats>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl ScanCoordinator {
    /// Create a coordinator using the configured classifier
    pub fn new(config: ScanConfig) -> Self {
        let classifier = config.build_classifier();
        Self::with_classifier(config, classifier)
    }

    /// Create a coordinator with an explicit classifier
    pub fn with_classifier(config: ScanConfig, classifier: Arc<dyn Classifier>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let walker = Walker::new(config.root.clone(), Arc::clone(&shutdown))
            .with_excludes(config.exclude_patterns.clone());

        Self {
            config: Arc::new(config),
            classifier,
            walker,
            worker_stats: Arc::new(WorkerStats::default()),
            shutdown,
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Snapshot of the running scan
    pub fn progress(&self, elapsed: Duration) -> ScanProgress {
        progress_snapshot(
            &self.walker.stats(),
            &self.worker_stats,
            self.config.worker_count,
            elapsed,
        )
    }

    /// Scan into the configured SQLite database
    pub fn run(&self) -> Result<ScanResult> {
        let path = self.config.output_path.clone();
        let mode = self.config.write_mode;

        let start_time = Utc::now();
        let conn = self.provision()?;
        record_start(&conn, &self.config, &start_time)?;

        // Worker connections wait for the lock in short slices so the
        // committer can watch the shutdown flag between attempts
        let execution = self.execute(|_| SqliteStore::open(&path, mode, LOCK_POLL_INTERVAL));

        if let Err(e) = finalize(&conn, &execution, &start_time) {
            match execution.error {
                // The scan's own error is the more useful one to report
                Some(_) => warn!(error = %e, "Failed to finalize database"),
                None => return Err(e.into()),
            }
        }

        execution.into_result()
    }

    /// Run the SQLite scan with a progress callback every 100 ms
    pub fn run_with_progress<F>(&self, progress_callback: F) -> Result<ScanResult>
    where
        F: Fn(ScanProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::new(AtomicBool::new(false));
        let walk_stats = self.walker.stats();
        let worker_stats = Arc::clone(&self.worker_stats);
        let total_workers = self.config.worker_count;

        let done_flag = Arc::clone(&done);
        // Always reports at least once, and once more after the scan ends
        let progress_handle = thread::spawn(move || loop {
            let finished = done_flag.load(Ordering::Relaxed);
            progress_callback(progress_snapshot(
                &walk_stats,
                &worker_stats,
                total_workers,
                start.elapsed(),
            ));
            if finished {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        });

        let result = self.run();

        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }

    /// Scan into stores produced by `open_store`, one per worker
    ///
    /// No provisioning or run metadata is written; the caller owns the
    /// store's lifecycle.
    pub fn run_with<S, O>(&self, open_store: O) -> Result<ScanResult>
    where
        S: EntryStore + Send + 'static,
        O: FnMut(usize) -> DbResult<S>,
    {
        self.execute(open_store).into_result()
    }

    fn provision(&self) -> Result<Connection> {
        let path = &self.config.output_path;
        info!(path = %path.display(), mode = self.config.write_mode.as_str(), "Opening database");

        let conn = Connection::open(path).map_err(|e| DbError::CreateFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        schema::configure_connection(&conn, self.config.busy_timeout)?;
        schema::provision(&conn, self.config.write_mode)?;
        Ok(conn)
    }

    fn execute<S, O>(&self, mut open_store: O) -> Execution
    where
        S: EntryStore + Send + 'static,
        O: FnMut(usize) -> DbResult<S>,
    {
        let start = Instant::now();
        let worker_count = self.config.worker_count;

        info!(
            root = %self.config.root.display(),
            workers = worker_count,
            "Starting scan"
        );

        // Every store opens before any work begins
        let mut stores = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            match open_store(id) {
                Ok(store) => stores.push(store),
                Err(e) => {
                    return Execution {
                        result: self.collect_result(start.elapsed(), false),
                        error: Some(e.into()),
                    }
                }
            }
        }

        let (sender, receiver) = queue::channel(self.config.queue_size, Arc::clone(&self.shutdown));
        let settings = self.config.commit_settings();

        let mut workers = Vec::with_capacity(worker_count);
        let mut worker_error: Option<WorkerError> = None;
        for (id, store) in stores.into_iter().enumerate() {
            match Worker::spawn_with_stats(
                id,
                receiver.clone(),
                Arc::clone(&self.classifier),
                store,
                settings,
                Arc::clone(&self.worker_stats),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    worker_error = Some(e);
                    break;
                }
            }
        }
        drop(receiver);
        debug!(count = workers.len(), "Workers spawned");

        let walk = if worker_error.is_none() {
            Some(self.walker.walk(sender))
        } else {
            drop(sender);
            None
        };

        for worker in workers {
            let id = worker.id();
            if let Err(e) = worker.join() {
                warn!(worker = id, error = %e, "Worker failed");
                worker_error.get_or_insert(e);
            }
        }

        let walk_completed = matches!(walk, Some(Ok(summary)) if summary.completed);
        let completed = walk_completed && !self.shutdown.load(Ordering::Relaxed);
        let result = self.collect_result(start.elapsed(), completed && worker_error.is_none());

        let error = match (worker_error, walk) {
            (Some(e), _) => Some(ScanError::Worker(e)),
            (None, Some(Err(e))) => Some(ScanError::Walk(e)),
            _ => None,
        };

        if error.is_none() {
            info!(
                entries = result.entries_emitted,
                rows = result.rows_committed,
                errors = result.walk_errors,
                duration_secs = result.duration.as_secs(),
                completed = result.completed,
                "Scan finished"
            );
        }

        Execution { result, error }
    }

    fn collect_result(&self, duration: Duration, completed: bool) -> ScanResult {
        let walk = self.walker.stats();
        let workers = &self.worker_stats;

        ScanResult {
            total_dirs: walk.dirs(),
            total_files: walk.files(),
            total_other: walk.other(),
            total_bytes: walk.bytes(),
            entries_emitted: walk.emitted(),
            entries_processed: workers.entries_processed(),
            rows_committed: workers.commit.rows_committed(),
            walk_errors: walk.errors(),
            classify_failures: workers.classify_failures(),
            insert_failures: workers.commit.insert_failures(),
            commit_retries: workers.commit.commit_retries(),
            duration,
            completed,
        }
    }
}

impl Execution {
    fn into_result(self) -> Result<ScanResult> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }

    fn status(&self) -> &'static str {
        if self.error.is_some() {
            "failed"
        } else if self.result.completed {
            "completed"
        } else {
            "interrupted"
        }
    }
}

fn progress_snapshot(
    walk: &WalkStats,
    workers: &WorkerStats,
    total_workers: usize,
    elapsed: Duration,
) -> ScanProgress {
    ScanProgress {
        dirs: walk.dirs(),
        files: walk.files(),
        bytes: walk.bytes(),
        entries_processed: workers.entries_processed(),
        rows_committed: workers.commit.rows_committed(),
        errors: walk.errors() + workers.classify_failures() + workers.commit.insert_failures(),
        total_workers,
        elapsed,
    }
}

fn record_start(
    conn: &Connection,
    config: &ScanConfig,
    start_time: &DateTime<Utc>,
) -> DbResult<()> {
    set_scan_info(conn, keys::STATUS, "running")?;
    set_scan_info(conn, keys::ROOT, &config.root.to_string_lossy())?;
    set_scan_info(conn, keys::WRITE_MODE, config.write_mode.as_str())?;
    set_scan_info(conn, keys::START_TIME, &start_time.to_rfc3339())?;
    set_scan_info(conn, keys::WORKER_COUNT, &config.worker_count.to_string())?;
    set_scan_info(conn, keys::COMMIT_INTERVAL, &config.commit_interval.to_string())?;
    set_scan_info(conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    set_scan_info(conn, keys::SCANNER_VERSION, env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

fn finalize(conn: &Connection, execution: &Execution, start_time: &DateTime<Utc>) -> DbResult<()> {
    info!("Creating indexes...");
    schema::create_indexes(conn)?;
    schema::optimize_for_reads(conn)?;

    let end_time = Utc::now();
    let result = &execution.result;
    let totals = [
        (keys::END_TIME, end_time.to_rfc3339()),
        (
            keys::DURATION_SECS,
            (end_time - *start_time).num_seconds().to_string(),
        ),
        (keys::TOTAL_ENTRIES, result.entries_emitted.to_string()),
        (keys::ROWS_COMMITTED, result.rows_committed.to_string()),
        (keys::TOTAL_DIRS, result.total_dirs.to_string()),
        (keys::TOTAL_FILES, result.total_files.to_string()),
        (keys::TOTAL_BYTES, result.total_bytes.to_string()),
        (keys::WALK_ERRORS, result.walk_errors.to_string()),
        (keys::CLASSIFY_FAILURES, result.classify_failures.to_string()),
        (keys::INSERT_FAILURES, result.insert_failures.to_string()),
    ];
    for (key, value) in &totals {
        set_scan_info(conn, key, value)?;
    }

    set_scan_info(conn, keys::STATUS, execution.status())?;
    Ok(())
}
