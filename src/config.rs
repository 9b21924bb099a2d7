//! Configuration types for calyx
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Construction of the selected classifier

use crate::classify::{Classifier, FileCommandClassifier, MagicClassifier};
use crate::db::CommitSettings;
use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Commit interval limits
const MIN_COMMIT_INTERVAL: usize = 1;
const MAX_COMMIT_INTERVAL: usize = 100_000;

/// Delay before the first commit retry
const COMMIT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Lock wait left for a partial batch after Ctrl-C
const SHUTDOWN_LOCK_GRACE: Duration = Duration::from_secs(10);

/// Parallel filesystem classifier with SQLite output
#[derive(Parser, Debug, Clone)]
#[command(
    name = "calyx",
    version,
    about = "Parallel filesystem classifier with SQLite output",
    long_about = "Walks a directory tree, classifies every entry by content and records \
                  the results in a SQLite database.\n\n\
                  Worker threads each hold their own database connection and commit \
                  in batches.",
    after_help = "EXAMPLES:\n    \
        calyx /data -o data.db\n    \
        calyx /srv/share -w 16 --mode upsert\n    \
        calyx /home --exclude '/\\.cache/' --classifier file"
)]
pub struct CliArgs {
    /// Directory to scan
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Output SQLite database
    #[arg(short, long, default_value = "calyx.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Handoff queue capacity (0 hands each entry directly to a worker)
    #[arg(long, default_value = "1024", value_name = "NUM")]
    pub queue_size: usize,

    /// Rows per transaction
    #[arg(short = 'b', long, default_value = "1000", value_name = "NUM")]
    pub commit_interval: usize,

    /// How rows from earlier runs are treated
    #[arg(short = 'm', long, value_enum, default_value_t = WriteMode::Replace)]
    pub mode: WriteMode,

    /// Content classifier
    #[arg(long, value_enum, default_value_t = ClassifierKind::Magic)]
    pub classifier: ClassifierKind,

    /// Program used by the `file` classifier
    #[arg(long, default_value = "file", value_name = "PATH")]
    pub file_command: PathBuf,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Seconds a batch may wait for the SQLite write lock
    #[arg(long, default_value = "300", value_name = "SECS")]
    pub busy_timeout: u64,

    /// Retries for a commit that finds the database busy
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub commit_retries: u32,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Treatment of rows left by earlier runs
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Drop and recreate the table
    #[default]
    Replace,

    /// Replace rows with the same path
    Upsert,

    /// Insert alongside existing rows
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Replace => "replace",
            WriteMode::Upsert => "upsert",
            WriteMode::Append => "append",
        }
    }
}

/// Available content classifiers
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    /// Built-in magic-byte detection
    #[default]
    Magic,

    /// External `file -b`
    File,
}

/// Get default worker count based on CPU cores
fn default_workers() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Absolute root directory
    pub root: PathBuf,

    /// Output database path
    pub output_path: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Handoff queue capacity
    pub queue_size: usize,

    /// Rows per transaction
    pub commit_interval: usize,

    /// Write mode for this run
    pub write_mode: WriteMode,

    /// Selected classifier
    pub classifier: ClassifierKind,

    /// Program for the `file` classifier
    pub file_command: PathBuf,

    /// Compiled exclusion patterns
    pub exclude_patterns: Vec<Regex>,

    /// How long a batch may wait for the write lock
    pub busy_timeout: Duration,

    /// Retries for busy commits
    pub commit_retries: u32,

    /// Show progress display
    pub show_progress: bool,

    /// Verbose output
    pub verbose: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let root = validate_root(&args.root)?;

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate commit interval
        if args.commit_interval < MIN_COMMIT_INTERVAL || args.commit_interval > MAX_COMMIT_INTERVAL
        {
            return Err(ConfigError::InvalidCommitInterval {
                size: args.commit_interval,
                min: MIN_COMMIT_INTERVAL,
                max: MAX_COMMIT_INTERVAL,
            });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }
        if args.output.is_dir() {
            return Err(ConfigError::InvalidOutputPath {
                path: args.output.clone(),
                reason: "Output is a directory".to_string(),
            });
        }

        Ok(Self {
            root,
            output_path: args.output,
            worker_count: args.workers,
            queue_size: args.queue_size,
            commit_interval: args.commit_interval,
            write_mode: args.mode,
            classifier: args.classifier,
            file_command: args.file_command,
            exclude_patterns,
            busy_timeout: Duration::from_secs(args.busy_timeout),
            commit_retries: args.commit_retries,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Configuration with defaults for the given root and output
    ///
    /// Skips validation; `from_args` is the checked path.
    pub fn new(root: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_path: output_path.into(),
            worker_count: default_workers(),
            queue_size: 1024,
            commit_interval: 1000,
            write_mode: WriteMode::Replace,
            classifier: ClassifierKind::Magic,
            file_command: PathBuf::from("file"),
            exclude_patterns: Vec::new(),
            busy_timeout: Duration::from_secs(300),
            commit_retries: 3,
            show_progress: false,
            verbose: false,
        }
    }

    /// Build the configured classifier
    pub fn build_classifier(&self) -> Arc<dyn Classifier> {
        match self.classifier {
            ClassifierKind::Magic => Arc::new(MagicClassifier::new()),
            ClassifierKind::File => Arc::new(FileCommandClassifier::new(self.file_command.clone())),
        }
    }

    /// Commit behaviour for the workers
    pub fn commit_settings(&self) -> CommitSettings {
        CommitSettings {
            interval: self.commit_interval,
            retries: self.commit_retries,
            retry_backoff: COMMIT_RETRY_BACKOFF,
            lock_wait: self.busy_timeout,
            shutdown_grace: SHUTDOWN_LOCK_GRACE,
        }
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, ConfigError> {
    let metadata = std::fs::metadata(root).map_err(|e| ConfigError::InvalidRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !metadata.is_dir() {
        return Err(ConfigError::InvalidRoot {
            path: root.to_path_buf(),
            reason: "Not a directory".to_string(),
        });
    }

    // Stored parents are absolute, so resolve a relative root once here
    std::path::absolute(root).map_err(|e| ConfigError::InvalidRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })
}
