//! Coordinator client.
//!
//! [`Coordinator`] is the seam the run pipeline talks through. The only
//! required operations are a JSON GET and a status POST; dataset, project
//! and next-dataset lookups are layered on top as provided methods so
//! that test doubles only have to answer raw requests.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::types::{DatasetJob, NextDataset, ProjectSpec, StatusUpdate};
use crate::error::CoordinatorError;

/// Environment variable holding the coordinator's base URL.
pub const CRUNCH_URL_KEY: &str = "CRUNCH_URL";

/// Environment variable holding the API token.
pub const CRUNCH_TOKEN_KEY: &str = "CRUNCH_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote service that hands out datasets and records their progress.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// GETs a JSON document from a path relative to the coordinator root.
    async fn get_json(&self, relative_url: &str) -> Result<Value, CoordinatorError>;

    /// Records a stage transition.
    async fn post_status(&self, update: &StatusUpdate) -> Result<(), CoordinatorError>;

    /// Fetches a dataset record by slug.
    async fn dataset(&self, slug: &str) -> Result<DatasetJob, CoordinatorError> {
        let url = format!("api/datasets/{}/", urlencoding::encode(slug));
        DatasetJob::from_json(self.get_json(&url).await?)
    }

    /// Fetches a project record by slug.
    async fn project(&self, slug: &str) -> Result<ProjectSpec, CoordinatorError> {
        let url = format!("api/projects/{}/", urlencoding::encode(slug));
        ProjectSpec::from_json(self.get_json(&url).await?)
    }

    /// Asks for the next unprocessed dataset, optionally within one project.
    ///
    /// Returns `None` when the coordinator has nothing left to hand out.
    async fn next_dataset(
        &self,
        project: Option<&str>,
    ) -> Result<Option<NextDataset>, CoordinatorError> {
        let url = match project {
            Some(project) => format!("api/projects/{}/next/", urlencoding::encode(project)),
            None => "api/next/".to_string(),
        };
        let next: NextDataset = serde_json::from_value(self.get_json(&url).await?)?;
        Ok(next.is_available().then_some(next))
    }
}

/// Where the coordinator lives and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    base_url: String,
    token: String,
}

impl CoordinatorConfig {
    /// Validates an explicit URL and token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, CoordinatorError> {
        let base_url = base_url.into();
        let token = token.into();
        if base_url.trim().is_empty() {
            return Err(CoordinatorError::MissingUrl);
        }
        if token.trim().is_empty() {
            return Err(CoordinatorError::MissingToken);
        }
        Ok(Self { base_url, token })
    }

    /// Reads `CRUNCH_URL` and `CRUNCH_TOKEN`.
    pub fn from_env() -> Result<Self, CoordinatorError> {
        let base_url = env::var(CRUNCH_URL_KEY).map_err(|_| CoordinatorError::MissingUrl)?;
        let token = env::var(CRUNCH_TOKEN_KEY).map_err(|_| CoordinatorError::MissingToken)?;
        Self::new(base_url, token)
    }

    /// The coordinator's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a relative path onto the base URL with exactly one slash between them.
    pub fn absolute_url(&self, relative_url: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            relative_url.trim_start_matches('/')
        )
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }
}

/// [`Coordinator`] backed by the coordinator's REST API.
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    config: CoordinatorConfig,
    http_client: Client,
}

impl HttpCoordinator {
    /// Creates a client for the given coordinator.
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Creates a client from `CRUNCH_URL` and `CRUNCH_TOKEN`.
    pub fn from_env() -> Result<Self, CoordinatorError> {
        Self::new(CoordinatorConfig::from_env()?)
    }

    /// The client's configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

/// Pulls the `detail` message out of an error body, if it has one.
fn detail_of(body: &Value) -> Option<String> {
    let detail = body.as_object()?.get("detail")?;
    Some(match detail {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

#[async_trait]
impl Coordinator for HttpCoordinator {
    async fn get_json(&self, relative_url: &str) -> Result<Value, CoordinatorError> {
        let url = self.config.absolute_url(relative_url);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.config.authorization())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = body
                .as_ref()
                .and_then(detail_of)
                .unwrap_or_else(|| format!("{}: {}", status, text));
            return Err(CoordinatorError::Api { url, detail });
        }

        let body = match body {
            Some(body) => body,
            None => serde_json::from_str(&text)?,
        };

        // A lone `detail` key is how the API reports errors on a 2xx.
        if let Some(map) = body.as_object() {
            if map.len() == 1 {
                if let Some(detail) = detail_of(&body) {
                    return Err(CoordinatorError::Api { url, detail });
                }
            }
        }

        Ok(body)
    }

    async fn post_status(&self, update: &StatusUpdate) -> Result<(), CoordinatorError> {
        let url = self.config.absolute_url("api/statuses/");
        debug!("POST {} stage={} state={}", url, update.stage, update.state);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.config.authorization())
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoordinatorError::ReportingFailed {
                status: status.as_u16(),
                payload: serde_json::to_string(update)?,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::diagnostics::Diagnostics;
    use crate::coordinator::types::{Stage, State};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Serves a single canned HTTP response and returns the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (format!("http://{}", address), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn client(base_url: &str) -> HttpCoordinator {
        HttpCoordinator::new(CoordinatorConfig::new(base_url, "secret").unwrap()).unwrap()
    }

    #[test]
    fn test_config_requires_url_and_token() {
        assert!(matches!(
            CoordinatorConfig::new("", "token"),
            Err(CoordinatorError::MissingUrl)
        ));
        assert!(matches!(
            CoordinatorConfig::new("http://www.example.com", " "),
            Err(CoordinatorError::MissingToken)
        ));
    }

    #[test]
    fn test_absolute_url() {
        let config = CoordinatorConfig::new("http://www.example.com/", "token").unwrap();
        assert_eq!(
            config.absolute_url("/api/datasets/d/"),
            "http://www.example.com/api/datasets/d/"
        );
        assert_eq!(config.absolute_url("api/next/"), "http://www.example.com/api/next/");
    }

    #[tokio::test]
    async fn test_get_dataset() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id": 2, "slug": "dataset", "parent": "project", "base_file_path": "project/dataset"}"#,
        )
        .await;

        let dataset = client(&base_url).dataset("dataset").await.unwrap();
        assert_eq!(dataset.id, 2);
        assert_eq!(dataset.project_slug, "project");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/datasets/dataset/ "));
        assert!(request.to_lowercase().contains("authorization: token secret"));
    }

    #[tokio::test]
    async fn test_detail_only_body_is_an_error() {
        let (base_url, server) = serve_once("200 OK", r#"{"detail": "Not found."}"#).await;

        let err = client(&base_url).get_json("api/datasets/missing/").await.unwrap_err();
        match err {
            CoordinatorError::Api { url, detail } => {
                assert!(url.ends_with("/api/datasets/missing/"));
                assert_eq!(detail, "Not found.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let (base_url, server) = serve_once("404 Not Found", r#"{"detail": "No such project."}"#).await;

        let err = client(&base_url).project("missing").await.unwrap_err();
        assert!(err.to_string().contains("No such project."));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_next_dataset_urls() {
        let (base_url, server) = serve_once("200 OK", r#"{"project": "p", "dataset": "d"}"#).await;
        let next = client(&base_url).next_dataset(Some("p")).await.unwrap().unwrap();
        assert_eq!(next.dataset, "d");
        assert!(server.await.unwrap().starts_with("GET /api/projects/p/next/ "));

        let (base_url, server) = serve_once("200 OK", r#"{"project": "", "dataset": ""}"#).await;
        let next = client(&base_url).next_dataset(None).await.unwrap();
        assert!(next.is_none());
        assert!(server.await.unwrap().starts_with("GET /api/next/ "));
    }

    #[tokio::test]
    async fn test_post_status() {
        let (base_url, server) = serve_once("201 Created", "{}").await;
        let update = StatusUpdate {
            dataset: 2,
            stage: Stage::Setup,
            state: State::Start,
            note: String::new(),
            diagnostics: Diagnostics::default(),
        };

        client(&base_url).post_status(&update).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/statuses/ "));
        assert!(request.contains(r#""stage":1"#));
        assert!(request.contains(r#""state":1"#));
    }

    #[tokio::test]
    async fn test_post_status_rejected() {
        let (base_url, server) = serve_once("400 Bad Request", r#"{"dataset": ["invalid"]}"#).await;
        let update = StatusUpdate {
            dataset: 99,
            stage: Stage::Upload,
            state: State::Fail,
            note: "oops".to_string(),
            diagnostics: Diagnostics::default(),
        };

        let err = client(&base_url).post_status(&update).await.unwrap_err();
        match err {
            CoordinatorError::ReportingFailed { status, payload } => {
                assert_eq!(status, 400);
                assert!(payload.contains("oops"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.await.unwrap();
    }
}
