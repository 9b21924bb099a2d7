//! Worker thread logic for parallel classification
//!
//! Each worker:
//! - Owns its own store connection (never shared between threads)
//! - Pulls entries from the shared queue
//! - Classifies each entry's content
//! - Appends the entry to its batch committer
//!
//! A worker stops when the queue is closed and drained, or when shutdown is
//! requested. Either way its partial batch is committed before it exits.
//! Workers only hold the database write lock while their committer writes a
//! full batch, so classification runs in parallel with other workers' writes.

use crate::classify::Classifier;
use crate::db::{BatchCommitter, CommitSettings, CommitStats, EntryStore};
use crate::entry::FilesystemEntry;
use crate::error::WorkerError;
use crate::walker::queue::EntryReceiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Entries taken from the queue and appended
    pub entries_processed: AtomicU64,

    /// Entries stored without a classification
    pub classify_failures: AtomicU64,

    /// Statistics of the worker's committer
    pub commit: Arc<CommitStats>,
}

impl WorkerStats {
    fn record_entry(&self) {
        self.entries_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_classify_failure(&self) {
        self.classify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entries_processed(&self) -> u64 {
        self.entries_processed.load(Ordering::Relaxed)
    }

    pub fn classify_failures(&self) -> u64 {
        self.classify_failures.load(Ordering::Relaxed)
    }
}

/// A worker thread that classifies and stores entries
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread owning `store`
    pub fn spawn<S>(
        id: usize,
        queue_rx: EntryReceiver,
        classifier: Arc<dyn Classifier>,
        store: S,
        settings: CommitSettings,
    ) -> Result<Self, WorkerError>
    where
        S: EntryStore + Send + 'static,
    {
        let stats = Arc::new(WorkerStats::default());
        Self::spawn_with_stats(id, queue_rx, classifier, store, settings, stats)
    }

    /// Spawn a worker reporting into existing (possibly shared) statistics
    pub fn spawn_with_stats<S>(
        id: usize,
        queue_rx: EntryReceiver,
        classifier: Arc<dyn Classifier>,
        store: S,
        settings: CommitSettings,
        stats: Arc<WorkerStats>,
    ) -> Result<Self, WorkerError>
    where
        S: EntryStore + Send + 'static,
    {
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || worker_loop(id, queue_rx, classifier, store, settings, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main worker loop
fn worker_loop<S: EntryStore>(
    id: usize,
    queue_rx: EntryReceiver,
    classifier: Arc<dyn Classifier>,
    store: S,
    settings: CommitSettings,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError> {
    debug!(worker = id, "Worker started");

    let mut committer = BatchCommitter::with_stats(store, settings, Arc::clone(&stats.commit))
        .with_shutdown(queue_rx.shutdown_flag());

    while let Some(mut entry) = queue_rx.recv() {
        classify_entry(id, classifier.as_ref(), &mut entry, &stats);

        if let Err(e) = committer.append(entry) {
            error!(worker = id, error = %e, "Worker stopping after store failure");
            return Err(WorkerError::Store { id, source: e });
        }
        stats.record_entry();
    }

    if let Err(e) = committer.finish() {
        error!(worker = id, error = %e, "Final commit failed");
        return Err(WorkerError::Store { id, source: e });
    }

    debug!(
        worker = id,
        entries = stats.entries_processed(),
        rows = stats.commit.rows_committed(),
        "Worker finished"
    );
    Ok(())
}

/// Attach a classification, leaving it empty when the classifier fails
fn classify_entry(
    id: usize,
    classifier: &dyn Classifier,
    entry: &mut FilesystemEntry,
    stats: &WorkerStats,
) {
    let path = entry.path();
    match classifier.classify(&path) {
        Ok(description) => {
            trace!(worker = id, path = %path.display(), class = %description, "Classified");
            entry.set_classification(description);
        }
        Err(e) => {
            debug!(worker = id, error = %e, "Classification failed");
            stats.record_classify_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifyError, DbError, DbResult};
    use crate::walker::queue::channel;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Store that keeps committed entries in memory
    #[derive(Clone, Default)]
    struct MemoryStore {
        open: Vec<FilesystemEntry>,
        committed: Arc<Mutex<Vec<FilesystemEntry>>>,
        fail_begin: bool,
    }

    impl EntryStore for MemoryStore {
        fn begin(&mut self) -> DbResult<()> {
            if self.fail_begin {
                return Err(DbError::Transaction("cannot begin".into()));
            }
            Ok(())
        }

        fn insert(&mut self, entry: &FilesystemEntry) -> DbResult<()> {
            self.open.push(entry.clone());
            Ok(())
        }

        fn commit(&mut self) -> DbResult<()> {
            self.committed.lock().unwrap().append(&mut self.open);
            Ok(())
        }

        fn rollback(&mut self) -> DbResult<()> {
            self.open.clear();
            Ok(())
        }
    }

    /// Classifier that fails for names starting with "bad"
    struct PickyClassifier;

    impl Classifier for PickyClassifier {
        fn classify(&self, path: &Path) -> Result<String, ClassifyError> {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if name.starts_with("bad") {
                return Err(ClassifyError::Command {
                    path: path.to_path_buf(),
                    reason: "unreadable".into(),
                });
            }
            Ok(format!("ASCII text, {}", name))
        }
    }

    fn entry(name: &str) -> FilesystemEntry {
        FilesystemEntry {
            parent: PathBuf::from("/data"),
            name: name.into(),
            entry_type: crate::entry::EntryType::File,
            size: 1,
            mode: 0o100644,
            modified: None,
            extension: crate::entry::extension_of(name),
            classification: String::new(),
            short_classification: String::new(),
        }
    }

    fn settings(interval: usize) -> CommitSettings {
        CommitSettings {
            interval,
            retries: 0,
            retry_backoff: Duration::from_millis(1),
            lock_wait: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_worker_classifies_and_commits_partial_batch() {
        let (sender, receiver) = channel(8, Arc::new(AtomicBool::new(false)));
        let store = MemoryStore::default();
        let committed = Arc::clone(&store.committed);

        let classifier = Arc::new(PickyClassifier);
        let worker = Worker::spawn(0, receiver, classifier, store, settings(2)).unwrap();
        for name in ["a.txt", "bad.bin", "c.md"] {
            sender.send(entry(name)).unwrap();
        }
        drop(sender);

        let stats = worker.stats();
        worker.join().unwrap();

        let committed = committed.lock().unwrap();
        assert_eq!(committed.len(), 3);
        assert_eq!(committed[0].classification, "ASCII text, a.txt");
        assert_eq!(committed[0].short_classification, "ASCII text");

        // Failed classification is still stored, with empty fields
        assert_eq!(committed[1].name_lossy(), "bad.bin");
        assert_eq!(committed[1].classification, "");
        assert_eq!(committed[1].short_classification, "");

        assert_eq!(stats.entries_processed(), 3);
        assert_eq!(stats.classify_failures(), 1);
        assert_eq!(stats.commit.transactions_committed(), 2);
    }

    #[test]
    fn test_worker_store_failure() {
        let (sender, receiver) = channel(8, Arc::new(AtomicBool::new(false)));
        let store = MemoryStore {
            fail_begin: true,
            ..Default::default()
        };

        let classifier = Arc::new(PickyClassifier);
        let worker = Worker::spawn(3, receiver, classifier, store, settings(10)).unwrap();
        sender.send(entry("a.txt")).unwrap();
        drop(sender);

        let err = worker.join().unwrap_err();
        assert!(matches!(err, WorkerError::Store { id: 3, .. }));
    }

    #[test]
    fn test_workers_split_entries() {
        let (sender, receiver) = channel(4, Arc::new(AtomicBool::new(false)));
        let store = MemoryStore::default();
        let committed = Arc::clone(&store.committed);

        let workers: Vec<Worker> = (0..4)
            .map(|id| {
                let classifier = Arc::new(PickyClassifier);
                Worker::spawn(id, receiver.clone(), classifier, store.clone(), settings(3)).unwrap()
            })
            .collect();
        drop(receiver);

        for i in 0..50 {
            sender.send(entry(&format!("f{}.txt", i))).unwrap();
        }
        drop(sender);

        for worker in workers {
            assert!(worker.id() < 4);
            worker.join().unwrap();
        }

        let mut names: Vec<String> = committed
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name_lossy())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 50);
    }
}
