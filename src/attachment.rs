//! Email attachments and the file source they are read from.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

/// Supplies raw bytes for a path.
///
/// The dispatcher never touches the filesystem directly; providers read
/// attachments through this trait so tests can swap in [`MemoryFiles`].
pub trait FileSource: Send + Sync {
    /// Read the whole file at `path`.
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileSource;

impl FileSource for FsFileSource {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory files, keyed by path. Anything not inserted is `NotFound`.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), data.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }
}

impl FileSource for MemoryFiles {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such file: {}", path.display()),
            )
        })
    }
}

/// A binary email attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename presented to the recipient
    pub filename: String,
    /// MIME content type (e.g., "application/pdf")
    pub content_type: String,
    /// Raw attachment data
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create an attachment from raw bytes.
    ///
    /// Content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Read an attachment from `path` through `files`.
    ///
    /// A missing or unreadable file is a [`NotificationError::Resource`].
    pub fn load(path: impl AsRef<Path>, files: &dyn FileSource) -> Result<Self, NotificationError> {
        let path = path.as_ref();
        let data = files.read_bytes(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                NotificationError::Resource(format!("Attachment file not found: {}", path.display()))
            } else {
                NotificationError::Resource(format!(
                    "Failed to read attachment {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        Ok(Self::from_bytes(filename, data))
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
