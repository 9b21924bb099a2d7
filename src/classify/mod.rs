//! Content classification
//!
//! A [`Classifier`] turns a path into a human-readable description of its
//! content. Descriptions follow the `file(1)` convention of comma-separated
//! details with the most general one first, so the text before the first
//! comma works as a summary.
//!
//! - [`MagicClassifier`]: in-process detection from magic bytes
//! - [`FileCommandClassifier`]: delegates to an external `file` binary

pub mod command;
pub mod magic;

use crate::error::ClassifyError;
use std::path::Path;

pub use command::FileCommandClassifier;
pub use magic::{describe_header, MagicClassifier};

/// Pluggable content classifier shared by all workers
pub trait Classifier: Send + Sync {
    /// Describe the content at `path`
    fn classify(&self, path: &Path) -> Result<String, ClassifyError>;
}
