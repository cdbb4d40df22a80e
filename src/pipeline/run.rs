//! The Setup → Workflow → Upload state machine.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use super::config::RunConfig;
use super::result::RunResult;
use super::workdir::WorkingDirectory;
use crate::checksum::{snapshot, ChecksumDiff, ChecksumMap};
use crate::coordinator::{Coordinator, CoordinatorError, DatasetJob, Stage, State, StatusReporter};
use crate::error::StorageError;
use crate::storage::{is_excluded, pull_all, push_changed, StorageBackend, SyncPolicy};
use crate::workflow::{write_workflow, ExitOutcome, WorkflowError, WorkflowRunner};

/// Errors that stop a run outright rather than failing a stage.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Please specify a dataset.")]
    MissingDataset,

    #[error("Coordinator returned dataset '{found}' when asked for '{expected}'")]
    SlugMismatch { expected: String, found: String },

    #[error("Dataset slug '{0}' cannot be used as a directory name")]
    InvalidSlug(String),

    /// A lookup failed, or a FAIL status could not be posted.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// Errors raised inside a stage. Their text becomes the FAIL note.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Coordinator returned project '{found}' when asked for '{expected}'")]
    ProjectMismatch { expected: String, found: String },

    #[error("No workflow available; the setup stage has not produced one")]
    NoWorkflow,
}

/// Processing of a single dataset.
pub struct Run {
    config: RunConfig,
    dataset: DatasetJob,
    workdir: WorkingDirectory,
    coordinator: Arc<dyn Coordinator>,
    storage: Arc<dyn StorageBackend>,
    reporter: StatusReporter,
    runner: WorkflowRunner,
    workflow_path: Option<PathBuf>,
    setup_checksums: ChecksumMap,
}

impl Run {
    /// Looks up the dataset and prepares a run for it.
    ///
    /// Nothing is written locally and no status is posted until a stage runs.
    pub async fn new(
        config: RunConfig,
        coordinator: Arc<dyn Coordinator>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let dataset = coordinator.dataset(&config.dataset_slug).await?;
        if dataset.slug != config.dataset_slug {
            return Err(RunError::SlugMismatch {
                expected: config.dataset_slug.clone(),
                found: dataset.slug,
            });
        }

        let workdir = WorkingDirectory::for_dataset(&config.base_directory, &dataset.slug)
            .ok_or_else(|| RunError::InvalidSlug(dataset.slug.clone()))?;

        Ok(Self {
            workflow_path: config.workflow_path.clone(),
            reporter: StatusReporter::new(coordinator.clone()),
            runner: WorkflowRunner::default(),
            setup_checksums: ChecksumMap::new(),
            config,
            dataset,
            workdir,
            coordinator,
            storage,
        })
    }

    /// Replaces the status reporter.
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the workflow runner.
    pub fn with_runner(mut self, runner: WorkflowRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn dataset(&self) -> &DatasetJob {
        &self.dataset
    }

    pub fn working_directory(&self) -> &WorkingDirectory {
        &self.workdir
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs all three stages, stopping at the first that fails.
    pub async fn execute(&mut self) -> Result<RunResult, RunError> {
        info!("Processing '{}'", self.dataset.slug);

        let result = self.setup().await?;
        if result.is_fail() {
            return Ok(result);
        }

        let result = self.workflow().await?;
        if result.is_fail() {
            return Ok(result);
        }

        self.upload().await
    }

    /// Pulls inputs, records their checksums and writes the run metadata.
    pub async fn setup(&mut self) -> Result<RunResult, RunError> {
        info!("Setup stage {}", self.dataset.slug);
        let outcome = self.try_setup().await;
        self.conclude(Stage::Setup, outcome).await
    }

    /// Runs the workflow.
    pub async fn workflow(&mut self) -> Result<RunResult, RunError> {
        info!("Workflow stage {}", self.dataset.slug);
        let outcome = self.try_workflow().await;
        self.conclude(Stage::Workflow, outcome).await
    }

    /// Pushes new and modified files back to storage.
    pub async fn upload(&mut self) -> Result<RunResult, RunError> {
        info!("Upload stage {}", self.dataset.slug);
        let outcome = self.try_upload().await;
        self.conclude(Stage::Upload, outcome).await
    }

    async fn try_setup(&mut self) -> Result<(), StageError> {
        self.report(Stage::Setup, State::Start).await?;
        self.workdir.create()?;

        if self.config.download {
            let copied =
                pull_all(&self.dataset.base_path, self.workdir.root(), self.storage.as_ref()).await?;
            info!("Pulled {} files from '{}'", copied, self.dataset.base_path);
        } else {
            info!("Skipping download for '{}'", self.dataset.slug);
        }

        self.setup_checksums = snapshot_in_background(self.workdir.root()).await?;
        self.setup_checksums.save(&self.workdir.setup_checksums())?;

        WorkingDirectory::write_json(&self.workdir.dataset_json(), &self.dataset.raw)?;

        let project = self.coordinator.project(&self.dataset.project_slug).await?;
        if project.slug != self.dataset.project_slug {
            return Err(StageError::ProjectMismatch {
                expected: self.dataset.project_slug.clone(),
                found: project.slug,
            });
        }
        WorkingDirectory::write_json(&self.workdir.project_json(), &project.raw)?;

        if self.workflow_path.is_none() {
            let path = write_workflow(
                &project.workflow_source,
                &self.workdir.control_dir(),
                self.config.workflow_kind,
            )?;
            self.workflow_path = Some(path);
        }

        self.report(Stage::Setup, State::Success).await?;
        Ok(())
    }

    async fn try_workflow(&mut self) -> Result<(), StageError> {
        self.report(Stage::Workflow, State::Start).await?;

        let workflow_path = self.workflow_path.clone().ok_or(StageError::NoWorkflow)?;
        let outcome = self
            .runner
            .execute(
                &workflow_path,
                self.workdir.root(),
                self.config.workflow_kind,
                self.config.cores,
            )
            .await?;
        if let ExitOutcome::Engine(engine) = outcome {
            info!("Pipeline engine finished with exit code {}", engine.exit_code);
        }

        self.report(Stage::Workflow, State::Success).await?;
        Ok(())
    }

    async fn try_upload(&mut self) -> Result<(), StageError> {
        self.report(Stage::Upload, State::Start).await?;

        let root = self.workdir.root().to_path_buf();
        let after = snapshot_in_background(&root).await?;
        let upload_checksums = self.workdir.upload_checksums();
        after.save(&upload_checksums)?;

        let diff = ChecksumDiff::between(&self.setup_checksums, &after);
        let deleted_manifest = self.workdir.deleted_manifest();
        std::fs::write(&deleted_manifest, diff.deleted_manifest())?;

        let mut paths = upload_paths(&diff, &root);
        paths.push(upload_checksums);
        paths.push(deleted_manifest);

        if self.config.upload {
            let summary = push_changed(
                &paths,
                &root,
                &self.dataset.base_path,
                self.storage.as_ref(),
                SyncPolicy::Checksum,
            )
            .await?;
            info!(
                "Uploaded {} files to '{}' ({} new, {} modified, {} deleted locally)",
                summary.uploaded.len(),
                self.dataset.base_path,
                diff.new.len(),
                diff.modified.len(),
                diff.deleted.len()
            );
        } else {
            info!("Skipping upload of {} files", paths.len());
        }

        if self.config.cleanup {
            info!("Removing {}", root.display());
            self.workdir.remove()?;
        }

        self.report(Stage::Upload, State::Success).await?;
        Ok(())
    }

    async fn report(&self, stage: Stage, state: State) -> Result<(), CoordinatorError> {
        self.reporter.send(self.dataset.id, stage, state, "").await
    }

    /// Turns a stage outcome into its result, posting FAIL on error.
    async fn conclude(
        &self,
        stage: Stage,
        outcome: Result<(), StageError>,
    ) -> Result<RunResult, RunError> {
        match outcome {
            Ok(()) => Ok(RunResult::Success),
            Err(e) => {
                let note = e.to_string();
                error!("{} failed for {}: {}", stage, self.dataset.slug, note);
                self.reporter
                    .send(self.dataset.id, stage, State::Fail, &note)
                    .await?;
                Ok(RunResult::Fail)
            }
        }
    }
}

/// Local paths of the new and modified files, minus the engine cache.
pub(crate) fn upload_paths(diff: &ChecksumDiff, root: &Path) -> Vec<PathBuf> {
    diff.changed()
        .into_iter()
        .filter(|relative| !is_excluded(relative))
        .map(|relative| root.join(relative))
        .collect()
}

async fn snapshot_in_background(directory: &Path) -> io::Result<ChecksumMap> {
    let directory = directory.to_path_buf();
    tokio::task::spawn_blocking(move || snapshot(&directory))
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ChecksumMap {
        entries
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect()
    }

    #[test]
    fn test_upload_paths_skip_engine_cache() {
        let before = map(&[("a.txt", "1"), ("b.txt", "2")]);
        let after = map(&[
            ("a.txt", "1"),
            ("b.txt", "3"),
            ("c.txt", "4"),
            (".snakemake/cache", "5"),
            (".snakemake/log/run.log", "6"),
        ]);

        let diff = ChecksumDiff::between(&before, &after);
        let paths = upload_paths(&diff, Path::new("/work"));

        assert_eq!(
            paths,
            vec![PathBuf::from("/work/b.txt"), PathBuf::from("/work/c.txt")]
        );
    }

    #[test]
    fn test_stage_error_text_is_note() {
        let err = StageError::from(StorageError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "No such file or directory",
        )));
        assert_eq!(err.to_string(), "No such file or directory");
    }
}
