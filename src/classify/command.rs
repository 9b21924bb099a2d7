//! Classification through an external `file(1)` binary
//!
//! Gives libmagic-quality descriptions at the cost of one process spawn per
//! entry. `-b` omits the filename prefix from the output.

use super::Classifier;
use crate::error::ClassifyError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Classifier that runs `<program> -b <path>`
#[derive(Debug, Clone)]
pub struct FileCommandClassifier {
    program: PathBuf,
}

impl FileCommandClassifier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for FileCommandClassifier {
    fn default() -> Self {
        Self::new("file")
    }
}

impl Classifier for FileCommandClassifier {
    fn classify(&self, path: &Path) -> Result<String, ClassifyError> {
        let output = Command::new(&self.program)
            .arg("-b")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ClassifyError::Command {
                path: path.to_path_buf(),
                reason: format!("failed to run '{}': {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            return Err(ClassifyError::Command {
                path: path.to_path_buf(),
                reason: format!(
                    "'{}' exited with {}: {}",
                    self.program.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program() {
        let classifier = FileCommandClassifier::new("/nonexistent/calyx-file-command");
        let err = classifier.classify(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ClassifyError::Command { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit() {
        let classifier = FileCommandClassifier::new("false");
        let err = classifier.classify(Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_is_trimmed() {
        // echo prints its arguments back: "-b /data/x\n"
        let classifier = FileCommandClassifier::new("echo");
        let described = classifier.classify(Path::new("/data/x")).unwrap();
        assert_eq!(described, "-b /data/x");
    }

    #[test]
    fn test_default_program() {
        assert_eq!(FileCommandClassifier::default().program(), Path::new("file"));
    }
}
