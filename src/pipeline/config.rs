//! Configuration for processing one dataset.

use std::path::PathBuf;

use super::run::RunError;
use crate::workflow::{Cores, WorkflowKind};

/// Default parent directory for working directories.
pub const DEFAULT_BASE_DIRECTORY: &str = "./tmp";

/// Configuration for a [`Run`](super::Run).
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Slug of the dataset to process.
    pub dataset_slug: String,
    /// Directory under which the per-dataset working directory is created.
    pub base_directory: PathBuf,
    /// Whether the workflow is a script or a Snakefile.
    pub workflow_kind: WorkflowKind,
    /// Local workflow file to use instead of the project's.
    pub workflow_path: Option<PathBuf>,
    /// Concurrency for the pipeline engine.
    pub cores: Cores,
    /// Pull the dataset's files from storage during setup.
    pub download: bool,
    /// Push changed files to storage during upload.
    pub upload: bool,
    /// Delete the working directory after a successful upload.
    pub cleanup: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl RunConfig {
    /// Creates a configuration for `dataset_slug` with defaults.
    pub fn new(dataset_slug: impl Into<String>) -> Self {
        Self {
            dataset_slug: dataset_slug.into(),
            base_directory: PathBuf::from(DEFAULT_BASE_DIRECTORY),
            workflow_kind: WorkflowKind::Pipeline,
            workflow_path: None,
            cores: Cores::default(),
            download: true,
            upload: true,
            cleanup: false,
        }
    }

    /// Sets the parent directory for working directories.
    pub fn with_base_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.base_directory = directory.into();
        self
    }

    /// Sets the workflow kind.
    pub fn with_workflow_kind(mut self, kind: WorkflowKind) -> Self {
        self.workflow_kind = kind;
        self
    }

    /// Uses a local workflow file instead of the project's.
    pub fn with_workflow_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.workflow_path = Some(path.into());
        self
    }

    /// Sets the pipeline engine concurrency.
    pub fn with_cores(mut self, cores: Cores) -> Self {
        self.cores = cores;
        self
    }

    /// Enables or disables pulling files during setup.
    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// Enables or disables pushing files during upload.
    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload;
        self
    }

    /// Enables or disables removing the working directory at the end.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Checks the configuration before any remote call is made.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.dataset_slug.trim().is_empty() {
            return Err(RunError::MissingDataset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("dataset");
        assert_eq!(config.dataset_slug, "dataset");
        assert_eq!(config.base_directory, PathBuf::from("./tmp"));
        assert_eq!(config.workflow_kind, WorkflowKind::Pipeline);
        assert!(config.workflow_path.is_none());
        assert_eq!(config.cores, Cores::default());
        assert!(config.download);
        assert!(config.upload);
        assert!(!config.cleanup);
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::new("dataset")
            .with_base_directory("/scratch")
            .with_workflow_kind(WorkflowKind::Script)
            .with_workflow_path("/opt/workflow.sh")
            .with_cores(Cores::All)
            .with_download(false)
            .with_upload(false)
            .with_cleanup(true);

        assert_eq!(config.base_directory, PathBuf::from("/scratch"));
        assert_eq!(config.workflow_kind, WorkflowKind::Script);
        assert_eq!(config.workflow_path, Some(PathBuf::from("/opt/workflow.sh")));
        assert_eq!(config.cores, Cores::All);
        assert!(!config.download);
        assert!(!config.upload);
        assert!(config.cleanup);
    }

    #[test]
    fn test_validation_requires_dataset() {
        assert!(RunConfig::new("dataset").validate().is_ok());
        assert!(matches!(
            RunConfig::default().validate(),
            Err(RunError::MissingDataset)
        ));
    }

    #[test]
    fn test_clone_keeps_cores() {
        let config = RunConfig::new("dataset").with_cores(Cores::All);
        let copy = config.clone();
        assert_eq!(copy.cores, Cores::All);
        assert_eq!(copy, config);
    }
}
