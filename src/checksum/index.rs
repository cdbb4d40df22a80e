//! MD5 index of a directory tree.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Component, Path};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Mapping from a file's path (relative to the snapshot root, `/`-separated)
/// to the lowercase hex MD5 of its contents.
///
/// Keys are kept sorted so two snapshots of identical trees serialize to
/// identical JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumMap(BTreeMap<String, String>);

impl ChecksumMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the checksum for a relative path.
    pub fn insert(&mut self, path: impl Into<String>, checksum: impl Into<String>) {
        self.0.insert(path.into(), checksum.into());
    }

    /// Returns the checksum recorded for a path.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    /// Returns true if the path is present in the map.
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot holds no files.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the relative paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(path, checksum)` pairs in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Writes the map to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Reads a map previously written with [`ChecksumMap::save`].
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl FromIterator<(String, String)> for ChecksumMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Hashes every regular file below `directory`.
///
/// Directories are skipped. Symlinks are followed, so a link to a file is
/// hashed as that file. The result only depends on file contents and
/// relative paths, never on timestamps or permissions.
pub fn snapshot(directory: &Path) -> io::Result<ChecksumMap> {
    let mut checksums = ChecksumMap::new();

    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(directory).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is not below {}",
                    entry.path().display(),
                    directory.display()
                ),
            )
        })?;

        checksums.insert(slash_path(relative), file_md5(entry.path())?);
    }

    Ok(checksums)
}

/// Streams a file through MD5 and returns the lowercase hex digest.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Renders a relative path with `/` separators whatever the host uses.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
