//! Filesystem entry types
//!
//! A [`FilesystemEntry`] is built by the walker from `lstat` data, enriched
//! with a classification by exactly one worker, and then handed to the store.

use chrono::{DateTime, Utc};
use std::ffi::{OsStr, OsString};
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt};

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Regular file
    File = 0,
    /// Directory
    Directory = 1,
    /// Symbolic link
    Symlink = 2,
    /// Block device
    BlockDevice = 3,
    /// Character device
    CharDevice = 4,
    /// Named pipe (FIFO)
    Fifo = 5,
    /// Unix socket
    Socket = 6,
    /// Unknown type
    Unknown = 255,
}

impl EntryType {
    /// Convert from a std file type (as returned by `symlink_metadata`)
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_dir() {
            return EntryType::Directory;
        }
        if file_type.is_file() {
            return EntryType::File;
        }
        if file_type.is_symlink() {
            return EntryType::Symlink;
        }

        #[cfg(unix)]
        {
            if file_type.is_block_device() {
                return EntryType::BlockDevice;
            }
            if file_type.is_char_device() {
                return EntryType::CharDevice;
            }
            if file_type.is_fifo() {
                return EntryType::Fifo;
            }
            if file_type.is_socket() {
                return EntryType::Socket;
            }
        }

        EntryType::Unknown
    }

    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == EntryType::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }
}

/// One discovered filesystem node
#[derive(Debug, Clone)]
pub struct FilesystemEntry {
    /// Absolute path of the containing directory (the root itself for the
    /// root sentinel)
    pub parent: PathBuf,

    /// Base name, empty for the root sentinel
    pub name: OsString,

    /// Entry type as seen by `lstat`
    pub entry_type: EntryType,

    /// Size in bytes (recorded for directories too)
    pub size: u64,

    /// Permission and type bits
    pub mode: u32,

    /// Last modification time, if the platform reports one
    pub modified: Option<DateTime<Utc>>,

    /// Lowercase suffix of `name` without the dot
    pub extension: String,

    /// Content description from the classifier (empty when it failed)
    pub classification: String,

    /// Text of `classification` before the first comma
    pub short_classification: String,
}

impl FilesystemEntry {
    /// Create an entry for a directory child
    pub fn from_metadata(parent: &Path, name: &OsStr, metadata: &Metadata) -> Self {
        let extension = extension_of(&name.to_string_lossy());

        Self {
            parent: parent.to_path_buf(),
            name: name.to_os_string(),
            entry_type: EntryType::from_file_type(metadata.file_type()),
            size: metadata.len(),
            mode: mode_bits(metadata),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            extension,
            classification: String::new(),
            short_classification: String::new(),
        }
    }

    /// Create the synthetic entry for the traversal root
    pub fn root(root: &Path, metadata: &Metadata) -> Self {
        Self::from_metadata(root, OsStr::new(""), metadata)
    }

    /// True for the synthetic root entry
    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    /// Check if this entry is a directory
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    /// Absolute path of the entry
    pub fn path(&self) -> PathBuf {
        if self.is_root() {
            self.parent.clone()
        } else {
            self.parent.join(&self.name)
        }
    }

    /// Name as stored in the database
    pub fn name_lossy(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    /// Modification time as RFC 3339 text
    pub fn modified_rfc3339(&self) -> Option<String> {
        self.modified.map(|t| t.to_rfc3339())
    }

    /// Attach the classifier output and derive the summary column
    pub fn set_classification(&mut self, classification: String) {
        self.short_classification = summarize(&classification).to_string();
        self.classification = classification;
    }
}

/// Lowercase suffix after the last `.` of `name`, empty if there is none
///
/// A leading dot counts as a separator, so `.hidden` yields `hidden`.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Text of a classification before its first comma
pub fn summarize(classification: &str) -> &str {
    classification.split(',').next().unwrap_or("")
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    metadata.mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    let file_type = metadata.file_type();
    let type_bits = if file_type.is_dir() {
        0o040000
    } else if file_type.is_symlink() {
        0o120000
    } else {
        0o100000
    };
    let perm_bits = if metadata.permissions().readonly() {
        0o444
    } else if file_type.is_dir() {
        0o755
    } else {
        0o644
    };
    type_bits | perm_bits
}
