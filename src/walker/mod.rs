//! Parallel filesystem scanner
//!
//! One walker thread produces entries; N workers classify and store them.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │        Walker           │
//!                     │  - Driver thread        │
//!                     │  - BFS, lstat children  │
//!                     └───────────┬─────────────┘
//!                                 │ bounded queue (backpressure)
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker 1 │             │  Worker 2 │             │  Worker N │
//! │ classify  │             │ classify  │             │ classify  │
//! │  SQLite   │             │  SQLite   │             │  SQLite   │
//! └───────────┘             └───────────┘             └───────────┘
//! ```

pub mod coordinator;
pub mod queue;
pub mod walk;
pub mod worker;

pub use coordinator::{ScanCoordinator, ScanProgress, ScanResult};
pub use queue::{channel, EntryReceiver, EntrySender, QueueError, QueueStats};
pub use walk::{WalkStats, WalkSummary, Walker};
pub use worker::{Worker, WorkerStats};
