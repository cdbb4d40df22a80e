//! Posting stage transitions to the coordinator.

use std::sync::Arc;

use tracing::info;

use super::client::Coordinator;
use super::diagnostics::Diagnostics;
use super::types::{Stage, State, StatusUpdate};
use crate::error::CoordinatorError;

/// Sends [`StatusUpdate`]s on behalf of a run.
///
/// Host diagnostics are collected fresh for every post unless a fixed
/// set was supplied with [`StatusReporter::with_diagnostics`].
#[derive(Clone)]
pub struct StatusReporter {
    coordinator: Arc<dyn Coordinator>,
    fixed_diagnostics: Option<Diagnostics>,
}

impl StatusReporter {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            coordinator,
            fixed_diagnostics: None,
        }
    }

    /// Attaches the same diagnostics to every post instead of probing the host.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.fixed_diagnostics = Some(diagnostics);
        self
    }

    /// Diagnostics to attach to the next post.
    pub fn diagnostics(&self) -> Diagnostics {
        match &self.fixed_diagnostics {
            Some(diagnostics) => diagnostics.clone(),
            None => Diagnostics::collect(),
        }
    }

    /// Posts one status with explicit diagnostics.
    pub async fn report(
        &self,
        dataset_id: u64,
        stage: Stage,
        state: State,
        note: &str,
        diagnostics: Diagnostics,
    ) -> Result<(), CoordinatorError> {
        info!("Dataset {}: {} {}", dataset_id, stage, state);
        let update = StatusUpdate {
            dataset: dataset_id,
            stage,
            state,
            note: note.to_string(),
            diagnostics,
        };
        self.coordinator.post_status(&update).await
    }

    /// Posts one status with the reporter's diagnostics.
    pub async fn send(
        &self,
        dataset_id: u64,
        stage: Stage,
        state: State,
        note: &str,
    ) -> Result<(), CoordinatorError> {
        self.report(dataset_id, stage, state, note, self.diagnostics())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<StatusUpdate>>,
    }

    #[async_trait]
    impl Coordinator for Recorder {
        async fn get_json(&self, relative_url: &str) -> Result<Value, CoordinatorError> {
            Err(CoordinatorError::Api {
                url: relative_url.to_string(),
                detail: "not served".to_string(),
            })
        }

        async fn post_status(&self, update: &StatusUpdate) -> Result<(), CoordinatorError> {
            self.posted.lock().await.push(update.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_uses_fixed_diagnostics() {
        let recorder = Arc::new(Recorder::default());
        let mut diagnostics = Diagnostics::default();
        diagnostics.insert("hostname", json!("agent-01"));

        let reporter = StatusReporter::new(recorder.clone()).with_diagnostics(diagnostics.clone());
        reporter
            .send(7, Stage::Workflow, State::Success, "")
            .await
            .unwrap();

        let posted = recorder.posted.lock().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].dataset, 7);
        assert_eq!(posted[0].stage, Stage::Workflow);
        assert_eq!(posted[0].state, State::Success);
        assert_eq!(posted[0].diagnostics, diagnostics);
    }

    #[tokio::test]
    async fn test_report_keeps_note() {
        let recorder = Arc::new(Recorder::default());
        let reporter = StatusReporter::new(recorder.clone());

        reporter
            .report(1, Stage::Setup, State::Fail, "disk full", Diagnostics::default())
            .await
            .unwrap();

        let posted = recorder.posted.lock().await;
        assert_eq!(posted[0].note, "disk full");
        assert!(posted[0].diagnostics.is_empty());
    }
}
