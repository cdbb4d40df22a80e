//! Error types shared across the agent.
//!
//! Defines the error enums for the two external collaborators the agent
//! talks to:
//! - The coordinator (dataset/project lookups and status posts)
//! - The remote storage backend (listing, reading and writing files)
//!
//! Errors local to a single subsystem (workflow execution, the run
//! pipeline) live next to the code that raises them.

use thiserror::Error;

/// Errors that can occur while talking to the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Please provide a base URL to a crunch hosted site. This can be set using the 'CRUNCH_URL' environment variable.")]
    MissingUrl,

    #[error("Please provide an authentication token. This can be set using the 'CRUNCH_TOKEN' environment variable.")]
    MissingToken,

    #[error("Error getting JSON response from URL '{url}': {detail}")]
    Api { url: String, detail: String },

    #[error("Failed sending status.\n{status}: {payload}")]
    ReportingFailed { status: u16, payload: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while using a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O failure, surfaced with the original message untouched.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Path not found in storage: {0}")]
    NotFound(String),

    #[error("Invalid storage path '{0}'")]
    InvalidPath(String),

    #[error("Invalid storage settings in '{path}': {reason}")]
    Settings { path: String, reason: String },

    #[error("Storage backend does not support {0}")]
    Unsupported(&'static str),
}
