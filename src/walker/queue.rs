//! Entry queue with backpressure support
//!
//! A bounded handoff queue between the walker and the workers. When the
//! queue is full the walker blocks, so memory stays bounded no matter how
//! far the walk runs ahead of classification.
//!
//! Blocking operations wake up every [`POLL_INTERVAL`] to check the shared
//! shutdown flag.

use crate::entry::FilesystemEntry;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often blocked queue operations check for shutdown
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reasons an entry could not be handed off
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Every receiver has been dropped
    #[error("all receivers disconnected")]
    Disconnected,

    /// Shutdown was requested while waiting for space
    #[error("shutdown requested")]
    Cancelled,
}

/// Statistics for the entry queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total entries enqueued
    pub enqueued: AtomicU64,

    /// Total entries dequeued
    pub dequeued: AtomicU64,

    /// Number of times the sender found the queue full
    pub backpressure_events: AtomicU64,
}

impl QueueStats {
    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Create a bounded entry queue
///
/// A capacity of zero gives a rendezvous channel: every send waits for a
/// worker to take the entry.
pub fn channel(capacity: usize, shutdown: Arc<AtomicBool>) -> (EntrySender, EntryReceiver) {
    let (sender, receiver) = bounded(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        EntrySender {
            sender,
            shutdown: Arc::clone(&shutdown),
            stats: Arc::clone(&stats),
        },
        EntryReceiver {
            receiver,
            shutdown,
            stats,
        },
    )
}

/// Handle for sending entries to the queue
///
/// Dropping the last sender closes the queue.
pub struct EntrySender {
    sender: Sender<FilesystemEntry>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<QueueStats>,
}

impl EntrySender {
    /// Send an entry, blocking while the queue is full
    pub fn send(&self, entry: FilesystemEntry) -> Result<(), QueueError> {
        let mut entry = entry;
        let mut waited = false;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(QueueError::Cancelled);
            }

            match self.sender.send_timeout(entry, POLL_INTERVAL) {
                Ok(()) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if !waited {
                        self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                        waited = true;
                    }
                    entry = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueError::Disconnected),
            }
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Handle for receiving entries from the queue (clone for each worker)
#[derive(Clone)]
pub struct EntryReceiver {
    receiver: Receiver<FilesystemEntry>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<QueueStats>,
}

impl EntryReceiver {
    /// Receive an entry from the queue
    ///
    /// Blocks until an entry is available. Returns `None` once the queue is
    /// closed and drained, or when shutdown is requested while idle.
    pub fn recv(&self) -> Option<FilesystemEntry> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return None;
            }

            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(entry) => {
                    self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                    return Some(entry);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// The shutdown flag this queue observes
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}
