//! Processing one dataset end to end.
//!
//! A [`Run`] walks a dataset through three stages, posting START and then
//! SUCCESS or FAIL for each:
//!
//! 1. **Setup**: pull the dataset's files from storage, snapshot their
//!    MD5 checksums, write `dataset.json`, `project.json` and the workflow
//!    file into `.crunch/`.
//! 2. **Workflow**: run the script or Snakefile in the working directory.
//! 3. **Upload**: snapshot again, write `upload_md5_checksums.json` and
//!    `deleted.txt`, and push new and modified files back to storage.
//!
//! The first stage to fail ends the run with [`RunResult::Fail`]. Errors
//! before any stage starts (unknown dataset, slug mismatch) and a FAIL
//! status that cannot be posted are returned as [`RunError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crunch_agent::pipeline::{Run, RunConfig};
//!
//! let config = RunConfig::new("my-dataset").with_base_directory("/scratch");
//! let mut run = Run::new(config, coordinator, storage).await?;
//! let result = run.execute().await?;
//! println!("{}: {}", run.dataset().slug, result);
//! ```

pub mod config;
pub mod result;
pub mod run;
pub mod workdir;

pub use config::{RunConfig, DEFAULT_BASE_DIRECTORY};
pub use result::RunResult;
pub use run::{Run, RunError, StageError};
pub use workdir::{sanitize_slug, WorkingDirectory, CONTROL_DIR};
