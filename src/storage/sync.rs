//! Copying files between a storage backend and a local directory.
//!
//! Any single failed copy aborts the whole call and its error is returned
//! as-is; there is no partial-success continuation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::backend::{join_path, StorageBackend};
use super::tree::walk;
use crate::checksum::index::slash_path;
use crate::error::StorageError;

/// Workflow engine's private cache directory. Never synced.
pub const ENGINE_CACHE_DIR: &str = ".snakemake";

/// How [`push_changed`] decides whether a file needs uploading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Upload every path given. The caller has already selected changed
    /// files by content hash.
    #[default]
    Checksum,
    /// Upload when the file is missing from the backend or the local copy
    /// is strictly newer than the stored one.
    ModifiedTime,
}

/// What a push did with each path it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Relative paths that were uploaded.
    pub uploaded: Vec<String>,
    /// Relative paths that were left alone.
    pub skipped: Vec<String>,
}

/// Returns true for relative paths that must never be synced.
pub fn is_excluded(relative: &str) -> bool {
    relative.split('/').next() == Some(ENGINE_CACHE_DIR)
}

fn local_path(local_dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(local_dir.to_path_buf(), |path, segment| path.join(segment))
}

/// Mirrors everything below `remote_base` into `local_dir`.
///
/// Local directories are created as needed (existing ones are fine) and
/// files are overwritten. Where the backend tracks modification times the
/// local copy is stamped with the stored time. Returns the number of files
/// copied.
pub async fn pull_all(
    remote_base: &str,
    local_dir: &Path,
    backend: &dyn StorageBackend,
) -> Result<usize, StorageError> {
    let tree = walk(remote_base, backend).await?;
    let mut copied = 0;

    for directory in tree.directory_descendants(true) {
        let target_dir = local_path(local_dir, directory.relative_path());
        fs::create_dir_all(&target_dir).await?;

        for file in directory.files() {
            let target = target_dir.join(file.name());
            info!(
                "Copying {} in {} on storage to {}",
                file.name(),
                directory.path(),
                target_dir.display()
            );

            let mut source = backend.open_for_read(file.path()).await?;
            let mut output = fs::File::create(&target).await?;
            tokio::io::copy(&mut source, &mut output).await?;
            output.flush().await?;
            drop(output);

            match backend.modified_time(file.path()).await {
                Ok(Some(modified)) => {
                    let mtime = FileTime::from_unix_time(
                        modified.timestamp(),
                        modified.timestamp_subsec_nanos(),
                    );
                    filetime::set_file_mtime(&target, mtime)?;
                }
                Ok(None) => debug!("No modification time for {}", file.path()),
                Err(e) => warn!("Could not read modification time of {}: {}", file.path(), e),
            }

            copied += 1;
        }
    }

    Ok(copied)
}

/// Uploads the given local files below `remote_base`.
///
/// Each path must lie below `local_dir`; it is stored at `remote_base`
/// joined with its path relative to `local_dir`. Files under
/// [`ENGINE_CACHE_DIR`] are always skipped.
pub async fn push_changed(
    paths: &[PathBuf],
    local_dir: &Path,
    remote_base: &str,
    backend: &dyn StorageBackend,
    policy: SyncPolicy,
) -> Result<PushSummary, StorageError> {
    let mut summary = PushSummary::default();

    for path in paths {
        let relative = path
            .strip_prefix(local_dir)
            .map(slash_path)
            .map_err(|_| StorageError::InvalidPath(path.display().to_string()))?;

        if is_excluded(&relative) {
            debug!("Skipping engine cache file {}", relative);
            summary.skipped.push(relative);
            continue;
        }

        let remote = join_path(remote_base, &relative);
        if policy == SyncPolicy::ModifiedTime && !is_newer_than_remote(path, &remote, backend).await? {
            debug!("{} is unchanged on storage", relative);
            summary.skipped.push(relative);
            continue;
        }

        info!("Uploading {} to {} on storage", path.display(), remote);
        let file = fs::File::open(path).await?;
        backend.save(&remote, Box::new(file)).await?;
        summary.uploaded.push(relative);
    }

    Ok(summary)
}

async fn is_newer_than_remote(
    path: &Path,
    remote: &str,
    backend: &dyn StorageBackend,
) -> Result<bool, StorageError> {
    if !backend.exists(remote).await? {
        return Ok(true);
    }

    let Some(remote_modified) = backend.modified_time(remote).await? else {
        return Ok(true);
    };

    let local_modified = DateTime::<Utc>::from(fs::metadata(path).await?.modified()?);
    Ok(local_modified > remote_modified)
}
