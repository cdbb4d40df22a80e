//! The storage backend abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::error::StorageError;

/// A readable byte stream handed to or returned from a backend.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// The direct children of one storage directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Names of subdirectories. Object stores may include a `"."` entry for
    /// the directory itself.
    pub directories: Vec<String>,
    /// Names of files.
    pub files: Vec<String>,
}

/// Uniform access to a remote file store.
///
/// Paths are `/`-separated strings relative to the backend root.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Lists the subdirectories and files directly below `path`.
    async fn list_children(&self, path: &str) -> Result<Listing, StorageError>;

    /// Opens a stored file for reading.
    async fn open_for_read(&self, path: &str) -> Result<ByteStream, StorageError>;

    /// Stores the full content of `content` at `path`, replacing any existing file.
    async fn save(&self, path: &str, content: ByteStream) -> Result<(), StorageError>;

    /// Returns true if a file exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Modification time of the file at `path`.
    ///
    /// `Ok(None)` means the backend does not track modification times.
    async fn modified_time(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Public URL for the file at `path`.
    fn url(&self, path: &str) -> Result<String, StorageError>;
}

/// Joins two storage paths with exactly one `/` between them.
pub fn join_path(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, relative),
    }
}
