//! Per-dataset working directory layout.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Control subdirectory holding run metadata.
pub const CONTROL_DIR: &str = ".crunch";
pub const DATASET_FILE: &str = "dataset.json";
pub const PROJECT_FILE: &str = "project.json";
pub const SETUP_CHECKSUMS_FILE: &str = "setup_md5_checksums.json";
pub const UPLOAD_CHECKSUMS_FILE: &str = "upload_md5_checksums.json";
pub const DELETED_FILE: &str = "deleted.txt";

/// Turns a dataset slug into a single safe path component.
///
/// Separators, colons and whitespace become `_`. Returns `None` for slugs
/// that would still name the current or parent directory.
pub fn sanitize_slug(slug: &str) -> Option<String> {
    let sanitized: String = slug
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" | "." | ".." => None,
        _ => Some(sanitized),
    }
}

/// The local scratch directory of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<base>/<sanitized slug>`, or `None` if the slug cannot name a directory.
    pub fn for_dataset(base: &Path, slug: &str) -> Option<Self> {
        sanitize_slug(slug).map(|name| Self::new(base.join(name)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control_dir(&self) -> PathBuf {
        self.root.join(CONTROL_DIR)
    }

    pub fn dataset_json(&self) -> PathBuf {
        self.control_dir().join(DATASET_FILE)
    }

    pub fn project_json(&self) -> PathBuf {
        self.control_dir().join(PROJECT_FILE)
    }

    pub fn setup_checksums(&self) -> PathBuf {
        self.control_dir().join(SETUP_CHECKSUMS_FILE)
    }

    pub fn upload_checksums(&self) -> PathBuf {
        self.control_dir().join(UPLOAD_CHECKSUMS_FILE)
    }

    pub fn deleted_manifest(&self) -> PathBuf {
        self.control_dir().join(DELETED_FILE)
    }

    /// Creates the root and control directories; existing ones are kept.
    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.control_dir())
    }

    /// Deletes the whole working directory.
    pub fn remove(&self) -> io::Result<()> {
        std::fs::remove_dir_all(&self.root)
    }

    /// Writes `value` as pretty-printed JSON.
    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(path, json)
    }
}
