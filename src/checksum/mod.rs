//! Content fingerprints for a working directory.
//!
//! The agent decides what to sync back to storage by comparing two
//! snapshots of the working directory: one taken right after the input
//! files are pulled, one taken after the workflow has run.
//!
//! - **Index**: [`snapshot`] hashes every regular file (MD5) into a [`ChecksumMap`]
//!   keyed by its `/`-separated path relative to the snapshot root
//! - **Diff**: [`ChecksumDiff`] splits two maps into new, deleted and modified paths
//!
//! # Example
//!
//! ```rust,ignore
//! use crunch_agent::checksum::{snapshot, ChecksumDiff};
//!
//! let before = snapshot(&workdir)?;
//! run_workflow(&workdir)?;
//! let after = snapshot(&workdir)?;
//!
//! let diff = ChecksumDiff::between(&before, &after);
//! for path in diff.changed() {
//!     println!("needs upload: {path}");
//! }
//! ```

pub mod diff;
pub mod index;

pub use diff::ChecksumDiff;
pub use index::{file_md5, snapshot, ChecksumMap};
