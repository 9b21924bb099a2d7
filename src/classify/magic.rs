//! In-process classification from magic bytes
//!
//! Regular files are described from the first [`DEFAULT_HEADER_LEN`] bytes
//! using the `infer` signature tables, with a plain-text check as fallback.
//! Special files are described from `lstat` alone: FIFOs would block on
//! open, and symlinks are reported rather than followed.

use super::Classifier;
use crate::error::ClassifyError;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;

/// Bytes read from the start of each file
pub const DEFAULT_HEADER_LEN: usize = 8192;

/// In-process classifier backed by magic-byte detection
#[derive(Debug, Clone)]
pub struct MagicClassifier {
    header_len: usize,
}

impl MagicClassifier {
    /// Create a classifier reading the default header length
    pub fn new() -> Self {
        Self {
            header_len: DEFAULT_HEADER_LEN,
        }
    }

    /// Read `len` bytes of each file instead of the default
    pub fn with_header_len(len: usize) -> Self {
        Self { header_len: len }
    }

    fn read_header(&self, path: &Path) -> Result<Vec<u8>, ClassifyError> {
        let read_err = |source| ClassifyError::Read {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(read_err)?;
        let mut header = Vec::with_capacity(self.header_len);
        file.take(self.header_len as u64)
            .read_to_end(&mut header)
            .map_err(read_err)?;
        Ok(header)
    }
}

impl Default for MagicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for MagicClassifier {
    fn classify(&self, path: &Path) -> Result<String, ClassifyError> {
        let metadata = fs::symlink_metadata(path).map_err(|source| ClassifyError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            return Ok("directory".to_string());
        }

        if file_type.is_symlink() {
            return match fs::read_link(path) {
                Ok(target) => Ok(format!("symbolic link to {}", target.display())),
                Err(source) => Err(ClassifyError::Read {
                    path: path.to_path_buf(),
                    source,
                }),
            };
        }

        #[cfg(unix)]
        {
            if file_type.is_fifo() {
                return Ok("fifo (named pipe)".to_string());
            }
            if file_type.is_socket() {
                return Ok("socket".to_string());
            }
            if file_type.is_block_device() {
                return Ok("block special".to_string());
            }
            if file_type.is_char_device() {
                return Ok("character special".to_string());
            }
        }

        if metadata.len() == 0 {
            return Ok("empty".to_string());
        }

        let header = self.read_header(path)?;
        Ok(describe_header(&header))
    }
}

/// Describe content from its header bytes
///
/// Recognized formats read `"<EXT> <kind>, <mime>"`; unrecognized content
/// falls back to a text check and finally to `"data"`.
///
/// # Example
///
/// ```
/// use calyx::classify::describe_header;
///
/// let png_header = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// assert_eq!(describe_header(png_header), "PNG image data, image/png");
/// assert_eq!(describe_header(b"hello world\n"), "ASCII text");
/// ```
pub fn describe_header(header: &[u8]) -> String {
    if header.is_empty() {
        return "empty".to_string();
    }

    if let Some(kind) = infer::get(header) {
        return format!(
            "{} {}, {}",
            kind.extension().to_uppercase(),
            kind_label(kind.matcher_type()),
            kind.mime_type()
        );
    }

    describe_text(header).unwrap_or("data").to_string()
}

fn kind_label(matcher: infer::MatcherType) -> &'static str {
    match matcher {
        infer::MatcherType::App => "executable",
        infer::MatcherType::Archive => "archive data",
        infer::MatcherType::Audio => "audio data",
        infer::MatcherType::Book => "ebook data",
        infer::MatcherType::Doc => "document",
        infer::MatcherType::Font => "font data",
        infer::MatcherType::Image => "image data",
        infer::MatcherType::Video => "video data",
        _ => "data",
    }
}

fn describe_text(header: &[u8]) -> Option<&'static str> {
    let text = match std::str::from_utf8(header) {
        Ok(text) => text,
        // A multi-byte sequence cut off by the header boundary is still text
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&header[..e.valid_up_to()]).ok()?,
        Err(_) => return None,
    };

    let printable = text
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x1b' | '\x08'));
    if !printable {
        return None;
    }

    if text.is_ascii() {
        Some("ASCII text")
    } else {
        Some("UTF-8 Unicode text")
    }
}
