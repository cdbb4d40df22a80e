//! Storage backend selection from a settings file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backend::StorageBackend;
use super::filesystem::FileSystemStorage;
use super::memory::MemoryStorage;
use crate::error::StorageError;

/// Which backend to use and how to configure it.
///
/// Loaded from a JSON (`.json`) or YAML (`.yaml`/`.yml`) file, e.g.
///
/// ```yaml
/// backend: filesystem
/// location: /mnt/crunch
/// base_url: https://files.example.com/crunch
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageSettings {
    /// Files below a local or mounted directory.
    Filesystem {
        location: PathBuf,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// A throwaway in-memory store.
    Memory {
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl StorageSettings {
    /// Reads settings from a JSON or YAML file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        let settings_error = |reason: String| StorageError::Settings {
            path: path.display().to_string(),
            reason,
        };

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| settings_error(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| settings_error(e.to_string()))
            }
            other => Err(settings_error(format!(
                "unsupported settings format {:?}, expected .json, .yaml or .yml",
                other.unwrap_or("")
            ))),
        }
    }

    /// Builds the configured backend.
    pub fn into_backend(self) -> Arc<dyn StorageBackend> {
        match self {
            StorageSettings::Filesystem { location, base_url } => {
                let storage = FileSystemStorage::new(location);
                match base_url {
                    Some(url) => Arc::new(storage.with_base_url(url)),
                    None => Arc::new(storage),
                }
            }
            StorageSettings::Memory { base_url } => {
                let storage = MemoryStorage::new();
                match base_url {
                    Some(url) => Arc::new(storage.with_base_url(url)),
                    None => Arc::new(storage),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"backend": "filesystem", "location": "/srv/crunch", "base_url": "http://www.example.com"}"#,
        )
        .unwrap();

        let settings = StorageSettings::load(&path).unwrap();
        assert_eq!(
            settings,
            StorageSettings::Filesystem {
                location: PathBuf::from("/srv/crunch"),
                base_url: Some("http://www.example.com".to_string()),
            }
        );
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        std::fs::write(&path, "backend: memory\n").unwrap();

        let settings = StorageSettings::load(&path).unwrap();
        assert_eq!(settings, StorageSettings::Memory { base_url: None });
    }

    #[test]
    fn test_unknown_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.ini");
        std::fs::write(&path, "backend=memory").unwrap();

        let err = StorageSettings::load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported settings format"));
    }

    #[test]
    fn test_unknown_backend() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"backend": "ftp"}"#).unwrap();

        assert!(matches!(
            StorageSettings::load(&path),
            Err(StorageError::Settings { .. })
        ));
    }

    #[test]
    fn test_into_backend_filesystem_url() {
        let backend = StorageSettings::Filesystem {
            location: PathBuf::from("/srv/crunch"),
            base_url: Some("http://www.example.com".to_string()),
        }
        .into_backend();

        assert_eq!(backend.url("a/b.txt").unwrap(), "http://www.example.com/a/b.txt");
    }
}
