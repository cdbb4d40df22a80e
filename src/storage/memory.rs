//! In-memory storage backend with object-store semantics.
//!
//! Files are flat keys; directories only exist as key prefixes. Like S3,
//! every listing reports a `"."` pseudo-directory for the prefix itself.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use super::backend::{join_path, ByteStream, Listing, StorageBackend};
use crate::error::StorageError;

/// Self-reference entry emitted in every listing.
const SELF_ENTRY: &str = ".";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Object-store-like backend holding everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    base_url: Option<String>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL prefix used when rendering links to stored objects.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Stores an object with an explicit modification time.
    pub async fn put_with_time(
        &self,
        path: &str,
        data: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) {
        self.objects.write().await.insert(
            normalize(path),
            StoredObject {
                data: data.into(),
                modified,
            },
        );
    }

    /// Stores an object stamped with the current time.
    pub async fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.put_with_time(path, data, Utc::now()).await;
    }

    /// Returns a copy of an object's content.
    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&normalize(path))
            .map(|object| object.data.clone())
    }

    /// All stored keys in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != SELF_ENTRY)
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn list_children(&self, path: &str) -> Result<Listing, StorageError> {
        let prefix = normalize(path);
        let objects = self.objects.read().await;

        let mut directories = BTreeSet::new();
        let mut files = Vec::new();

        for key in objects.keys() {
            let rest = if prefix.is_empty() {
                key.as_str()
            } else {
                match key.strip_prefix(&prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(rest) => rest,
                    None => continue,
                }
            };

            match rest.split_once('/') {
                Some((directory, _)) => {
                    directories.insert(directory.to_string());
                }
                None => files.push(rest.to_string()),
            }
        }

        let mut listing = Listing {
            directories: vec![SELF_ENTRY.to_string()],
            files,
        };
        listing.directories.extend(directories);
        Ok(listing)
    }

    async fn open_for_read(&self, path: &str) -> Result<ByteStream, StorageError> {
        let data = self
            .get(path)
            .await
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn save(&self, path: &str, mut content: ByteStream) -> Result<(), StorageError> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        self.put(path, data).await;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.contains_key(&normalize(path)))
    }

    async fn modified_time(&self, path: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.objects
            .read()
            .await
            .get(&normalize(path))
            .map(|object| Some(object.modified))
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn url(&self, path: &str) -> Result<String, StorageError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(StorageError::Unsupported("object URLs without a base_url"))?;
        Ok(join_path(base_url, &normalize(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_includes_self_entry_and_prefixes() {
        let storage = MemoryStorage::new();
        storage.put("data/a.txt", "a").await;
        storage.put("data/sub/b.txt", "b").await;
        storage.put("data/sub/deeper/c.txt", "c").await;
        storage.put("other/d.txt", "d").await;

        let listing = storage.list_children("data").await.unwrap();
        assert_eq!(listing.directories, vec![".".to_string(), "sub".to_string()]);
        assert_eq!(listing.files, vec!["a.txt".to_string()]);

        let root = storage.list_children("").await.unwrap();
        assert_eq!(
            root.directories,
            vec![".".to_string(), "data".to_string(), "other".to_string()]
        );
        assert!(root.files.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_does_not_match_partial_names() {
        let storage = MemoryStorage::new();
        storage.put("data2/a.txt", "a").await;

        let listing = storage.list_children("data").await.unwrap();
        assert_eq!(listing.directories, vec![".".to_string()]);
        assert!(listing.files.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let storage = MemoryStorage::new();
        storage
            .save("x/y.txt", Box::new(std::io::Cursor::new(b"hello".to_vec())))
            .await
            .unwrap();

        assert!(storage.exists("/x/y.txt").await.unwrap());
        assert_eq!(storage.get("x/y.txt").await.unwrap(), b"hello");

        let mut reader = storage.open_for_read("x/y.txt").await.unwrap();
        let mut data = String::new();
        reader.read_to_string(&mut data).await.unwrap();
        assert_eq!(data, "hello");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.open_for_read("nope").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(storage.modified_time("nope").await.is_err());
    }

    #[test]
    fn test_url() {
        let storage = MemoryStorage::new().with_base_url("https://bucket.example.com/");
        assert_eq!(
            storage.url("data/a.txt").unwrap(),
            "https://bucket.example.com/data/a.txt"
        );
    }
}
