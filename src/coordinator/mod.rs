//! Coordinator protocol.
//!
//! The coordinator is the web service that owns projects and datasets.
//! An agent uses it to:
//! - look up dataset and project records
//! - ask for the next dataset nobody has processed yet
//! - post SETUP/WORKFLOW/UPLOAD × START/SUCCESS/FAIL transitions
//!
//! Requests authenticate with an `Authorization: Token <token>` header.
//! Every status post carries a bag of host [`Diagnostics`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crunch_agent::coordinator::{Coordinator, HttpCoordinator, Stage, State, StatusReporter};
//!
//! let coordinator = Arc::new(HttpCoordinator::from_env()?);
//! let dataset = coordinator.dataset("my-dataset").await?;
//! StatusReporter::new(coordinator)
//!     .send(dataset.id, Stage::Setup, State::Start, "")
//!     .await?;
//! ```

pub mod client;
pub mod diagnostics;
pub mod status;
pub mod types;

pub use crate::error::CoordinatorError;
pub use client::{Coordinator, CoordinatorConfig, HttpCoordinator, CRUNCH_TOKEN_KEY, CRUNCH_URL_KEY};
pub use diagnostics::Diagnostics;
pub use status::StatusReporter;
pub use types::{DatasetJob, NextDataset, ProjectSpec, Stage, State, StatusUpdate};
