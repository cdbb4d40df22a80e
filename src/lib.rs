//! crunch-agent: processing agent for crunch datasets.
//!
//! An agent claims a dataset from the coordinator, pulls its files from a
//! storage backend, runs the project's workflow over them and pushes the
//! new and modified files back, posting a status for every stage.

pub mod checksum;
pub mod cli;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use error::{CoordinatorError, StorageError};
pub use pipeline::{Run, RunConfig, RunError, RunResult};
