//! Workflow execution.
//!
//! A project's workflow is either a shell script or a Snakefile:
//!
//! - [`write_workflow`] materializes the project's workflow text inside
//!   the run's `.crunch/` directory.
//! - [`WorkflowRunner::execute`] runs it in the working directory, with
//!   stdout and stderr streamed to `crunch-stdout.log` and
//!   `crunch-stderr.log`.
//!
//! A script that exits non-zero is a [`WorkflowError::ScriptFailed`]. The
//! pipeline engine reports through its exit code, so any exit is an
//! [`EngineOutcome`] and only a failure to launch it is an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use crunch_agent::workflow::{execute, write_workflow, Cores, WorkflowKind};
//!
//! let script = write_workflow("#!/bin/sh\nls > listing.txt\n", &control_dir, WorkflowKind::Script)?;
//! execute(&script, &working_dir, WorkflowKind::Script, Cores::default()).await?;
//! ```

pub mod artifact;
pub mod frontend;
pub mod kind;
pub mod runner;

pub use artifact::write_workflow;
pub use frontend::CondaFrontend;
pub use kind::{Cores, WorkflowKind};
pub use runner::{
    engine_args, execute, log_paths, EngineOutcome, ExitOutcome, WorkflowError, WorkflowRunner,
    PIPELINE_ENGINE, STDERR_LOG, STDOUT_LOG,
};
