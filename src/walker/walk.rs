//! Breadth-first directory walker
//!
//! The walker runs on the driver thread and is the only producer for the
//! entry queue:
//!
//! ```text
//! pending dirs (VecDeque)
//! │
//! └── pop dir → read_dir → sort by name → lstat each child
//!                                            │
//!                          ┌─────────────────┴──────────────┐
//!                          │ directory: push to pending     │
//!                          │ every child: send to queue     │
//!                          └────────────────────────────────┘
//! ```
//!
//! Listing and stat failures below the root are logged and skipped. The
//! walker takes its [`EntrySender`] by value, so the queue closes on every
//! exit path and the workers always drain and stop.

use crate::entry::{EntryType, FilesystemEntry};
use crate::error::{WalkError, WalkResult};
use crate::walker::queue::{EntrySender, QueueError};
use regex::Regex;
use std::collections::VecDeque;
use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Counters updated while the walk runs
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Directories emitted, root included
    pub dirs: AtomicU64,

    /// Regular files emitted
    pub files: AtomicU64,

    /// Symlinks, devices, FIFOs and sockets emitted
    pub other: AtomicU64,

    /// Sum of regular file sizes
    pub bytes: AtomicU64,

    /// Directories or children skipped after an error
    pub errors: AtomicU64,

    /// Entries handed to the queue
    pub emitted: AtomicU64,
}

impl WalkStats {
    /// Record an emitted entry
    pub fn record_entry(&self, entry_type: EntryType, size: u64) {
        if entry_type.is_dir() {
            self.dirs.fetch_add(1, Ordering::Relaxed);
        } else if entry_type.is_file() {
            self.files.fetch_add(1, Ordering::Relaxed);
            self.bytes.fetch_add(size, Ordering::Relaxed);
        } else {
            self.other.fetch_add(1, Ordering::Relaxed);
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped directory or child
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dirs(&self) -> u64 {
        self.dirs.load(Ordering::Relaxed)
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn other(&self) -> u64 {
        self.other.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

/// Outcome of a walk that was not aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Entries handed to the queue
    pub emitted: u64,

    /// False when shutdown stopped the walk early
    pub completed: bool,
}

/// Single-threaded producer of filesystem entries
pub struct Walker {
    root: PathBuf,
    exclude_patterns: Vec<Regex>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WalkStats>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            root: root.into(),
            exclude_patterns: Vec::new(),
            shutdown,
            stats: Arc::new(WalkStats::default()),
        }
    }

    /// Skip children whose absolute path matches any pattern
    pub fn with_excludes(mut self, patterns: Vec<Regex>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Get walk statistics
    pub fn stats(&self) -> Arc<WalkStats> {
        Arc::clone(&self.stats)
    }

    /// Walk the tree, sending every entry to `sender`
    ///
    /// The root sentinel is emitted first, then each directory's children in
    /// name order, level by level.
    pub fn walk(&self, sender: EntrySender) -> WalkResult<WalkSummary> {
        let root_meta = fs::metadata(&self.root).map_err(|source| WalkError::Unreadable {
            path: self.root.clone(),
            source,
        })?;
        if !root_meta.is_dir() {
            return Err(WalkError::NotADirectory {
                path: self.root.clone(),
            });
        }

        debug!(root = %self.root.display(), "Starting walk");

        if !self.emit(&sender, FilesystemEntry::root(&self.root, &root_meta))? {
            return Ok(self.summary(false));
        }

        let mut pending = VecDeque::new();
        pending.push_back(self.root.clone());

        while let Some(dir) = pending.pop_front() {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Shutdown requested, stopping walk");
                return Ok(self.summary(false));
            }

            let children = match read_children(&dir) {
                Ok(children) => children,
                Err(e) => {
                    warn!(error = %e, "Skipping directory");
                    self.stats.record_error();
                    continue;
                }
            };

            for child in children {
                let path = child.path();
                if self.is_excluded(&path) {
                    trace!(path = %path.display(), "Excluded");
                    continue;
                }

                // DirEntry::metadata does not follow symlinks
                let metadata = match child.metadata() {
                    Ok(m) => m,
                    Err(source) => {
                        let e = WalkError::StatFailed { path, source };
                        warn!(error = %e, "Skipping entry");
                        self.stats.record_error();
                        continue;
                    }
                };

                let entry = FilesystemEntry::from_metadata(&dir, &child.file_name(), &metadata);
                if entry.is_dir() {
                    pending.push_back(path);
                }

                if !self.emit(&sender, entry)? {
                    return Ok(self.summary(false));
                }
            }
        }

        debug!(
            emitted = self.stats.emitted(),
            backpressure = sender.stats().backpressure_count(),
            "Walk finished"
        );
        Ok(self.summary(true))
    }

    /// Returns `Ok(false)` when shutdown interrupted the send
    fn emit(&self, sender: &EntrySender, entry: FilesystemEntry) -> WalkResult<bool> {
        let (entry_type, size) = (entry.entry_type, entry.size);
        match sender.send(entry) {
            Ok(()) => {
                self.stats.record_entry(entry_type, size);
                Ok(true)
            }
            Err(QueueError::Cancelled) => Ok(false),
            Err(QueueError::Disconnected) => Err(WalkError::QueueClosed),
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }

    fn summary(&self, completed: bool) -> WalkSummary {
        WalkSummary {
            emitted: self.stats.emitted(),
            completed,
        }
    }
}

/// List a directory's children sorted by name
fn read_children(dir: &Path) -> WalkResult<Vec<DirEntry>> {
    let listing_err = |source| WalkError::ReadDirFailed {
        path: dir.to_path_buf(),
        source,
    };

    let mut children = fs::read_dir(dir)
        .map_err(listing_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(listing_err)?;
    children.sort_by_key(|c| c.file_name());
    Ok(children)
}
