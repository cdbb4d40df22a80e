//! Storage backend rooted in a local directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::backend::{ByteStream, Listing, StorageBackend};
use crate::error::StorageError;

/// A backend that stores files below a directory on the local filesystem.
///
/// Useful for shared network mounts and for tests.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    location: PathBuf,
    base_url: Option<String>,
}

impl FileSystemStorage {
    /// Creates a backend rooted at `location`.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            base_url: None,
        }
    }

    /// Sets the URL prefix used when rendering links to stored files.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Returns the root directory of this backend.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Maps a storage path onto the local filesystem, refusing to leave the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut resolved = self.location.clone();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(StorageError::InvalidPath(path.to_string())),
                name => resolved.push(name),
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl StorageBackend for FileSystemStorage {
    async fn list_children(&self, path: &str) -> Result<Listing, StorageError> {
        let directory = self.resolve(path)?;
        let mut listing = Listing::default();

        let mut entries = fs::read_dir(&directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                listing.directories.push(name);
            } else {
                listing.files.push(name);
            }
        }

        listing.directories.sort();
        listing.files.sort();
        Ok(listing)
    }

    async fn open_for_read(&self, path: &str) -> Result<ByteStream, StorageError> {
        let file = fs::File::open(self.resolve(path)?).await?;
        Ok(Box::new(file))
    }

    async fn save(&self, path: &str, mut content: ByteStream) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&target).await?;
        let bytes = tokio::io::copy(&mut content, &mut file).await?;
        file.sync_all().await?;

        debug!("Saved {} bytes to {}", bytes, target.display());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.resolve(path)?).await?)
    }

    async fn modified_time(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let metadata = fs::metadata(self.resolve(path)?).await?;
        Ok(Some(DateTime::<Utc>::from(metadata.modified()?)))
    }

    fn url(&self, path: &str) -> Result<String, StorageError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(StorageError::Unsupported("file URLs without a base_url"))?;

        let encoded = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!("{}/{}", base_url.trim_end_matches('/'), encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_list_children() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("base/sub")).unwrap();
        std::fs::write(temp.path().join("base/b.txt"), "b").unwrap();
        std::fs::write(temp.path().join("base/a.txt"), "a").unwrap();

        let storage = FileSystemStorage::new(temp.path());
        let listing = storage.list_children("base").await.unwrap();

        assert_eq!(listing.directories, vec!["sub".to_string()]);
        assert_eq!(listing.files, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_io_error() {
        let temp = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(temp.path());

        let err = storage.list_children("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn test_save_creates_parents_and_reads_back() {
        let temp = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(temp.path());

        let content: ByteStream = Box::new(std::io::Cursor::new(b"payload".to_vec()));
        storage.save("deep/dir/file.bin", content).await.unwrap();

        assert!(storage.exists("deep/dir/file.bin").await.unwrap());
        assert!(!storage.exists("deep/dir/other.bin").await.unwrap());

        let mut reader = storage.open_for_read("deep/dir/file.bin").await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"payload");

        assert!(storage
            .modified_time("deep/dir/file.bin")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_parent_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(temp.path());

        let err = storage.exists("../escape").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn test_url() {
        let storage = FileSystemStorage::new("/srv/data").with_base_url("http://www.example.com/media/");
        assert_eq!(
            storage.url("dataset/my file.txt").unwrap(),
            "http://www.example.com/media/dataset/my%20file.txt"
        );

        let no_base = FileSystemStorage::new("/srv/data");
        assert!(no_base.url("dataset/file.txt").is_err());
    }
}
