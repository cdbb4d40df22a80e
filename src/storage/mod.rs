//! Remote storage access for dataset files.
//!
//! This module provides the backend-agnostic view of a dataset's files
//! that the agent pulls inputs from and pushes results to.
//!
//! # Overview
//!
//! The storage system consists of:
//! - **Backend**: the [`StorageBackend`] trait (list, read, save, exists, mtime, URL)
//! - **Filesystem / Memory**: concrete backends, selected through [`StorageSettings`]
//! - **Tree**: [`walk`] builds an in-memory [`StorageDirectory`] tree from a backend
//! - **Sync**: [`pull_all`] and [`push_changed`] copy files between a backend and a local directory
//!
//! The backend is always passed in explicitly; there is no process-wide
//! default storage.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crunch_agent::storage::{pull_all, push_changed, StorageSettings, SyncPolicy};
//!
//! let backend = StorageSettings::load("storage.yaml".as_ref())?.into_backend();
//!
//! // Mirror the dataset into a local directory
//! pull_all("crunch/project/dataset", &workdir, backend.as_ref()).await?;
//!
//! // Push back only the files we know changed
//! push_changed(&changed, &workdir, "crunch/project/dataset", backend.as_ref(), SyncPolicy::Checksum).await?;
//! ```

pub mod backend;
pub mod filesystem;
pub mod memory;
pub mod settings;
pub mod sync;
pub mod tree;

pub use crate::error::StorageError;
pub use backend::{join_path, ByteStream, Listing, StorageBackend};
pub use filesystem::FileSystemStorage;
pub use memory::MemoryStorage;
pub use settings::StorageSettings;
pub use sync::{is_excluded, pull_all, push_changed, PushSummary, SyncPolicy, ENGINE_CACHE_DIR};
pub use tree::{
    render_listing, render_listing_html, walk, NodeRef, StorageDirectory, StorageFile,
    StorageNode, FAILED_TO_READ_STORAGE,
};
