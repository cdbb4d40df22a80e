//! Running a workflow as a subprocess.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frontend::CondaFrontend;
use super::kind::{Cores, WorkflowKind};

/// Log file receiving the workflow's stdout, inside the working directory.
pub const STDOUT_LOG: &str = "crunch-stdout.log";

/// Log file receiving the workflow's stderr, inside the working directory.
pub const STDERR_LOG: &str = "crunch-stderr.log";

/// Default pipeline engine executable.
pub const PIPELINE_ENGINE: &str = "snakemake";

const SPAWN_ATTEMPTS: u32 = 5;

/// Most stderr kept in memory for a failed script's error message.
const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// Errors raised while executing a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Workflow script exited with code {code}:\n{stderr}")]
    ScriptFailed { code: i32, stderr: String },

    #[error("Workflow I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How the pipeline engine finished.
///
/// The engine reports its result through its exit code, so any exit
/// counts as a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOutcome {
    pub completed: bool,
    pub exit_code: i32,
}

/// Result of a workflow that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// A script that exited with status zero.
    Script,
    /// A pipeline engine invocation.
    Engine(EngineOutcome),
}

/// Executes workflows in a working directory.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    engine_program: String,
}

impl Default for WorkflowRunner {
    fn default() -> Self {
        Self {
            engine_program: PIPELINE_ENGINE.to_string(),
        }
    }
}

impl WorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different pipeline engine executable.
    pub fn with_engine_program(mut self, program: impl Into<String>) -> Self {
        self.engine_program = program.into();
        self
    }

    /// The pipeline engine executable.
    pub fn engine_program(&self) -> &str {
        &self.engine_program
    }

    /// Runs `workflow_path` in `working_directory`.
    ///
    /// `cores` only applies to the pipeline engine. Both log files exist
    /// once this returns, whatever the outcome.
    pub async fn execute(
        &self,
        workflow_path: &Path,
        working_directory: &Path,
        kind: WorkflowKind,
        cores: Cores,
    ) -> Result<ExitOutcome, WorkflowError> {
        let workflow_path = std::path::absolute(workflow_path)?;
        let working_directory = std::path::absolute(working_directory)?;

        match kind {
            WorkflowKind::Script => {
                debug!("Ignoring cores={} for script workflow", cores);
                let command = Command::new(&workflow_path);
                let (status, stderr) =
                    run_logged(command, &workflow_path.display().to_string(), &working_directory)
                        .await?;
                if status.success() {
                    Ok(ExitOutcome::Script)
                } else {
                    Err(WorkflowError::ScriptFailed {
                        code: status.code().unwrap_or(-1),
                        stderr,
                    })
                }
            }
            WorkflowKind::Pipeline => {
                let frontend = CondaFrontend::detect().await;
                let mut command = Command::new(&self.engine_program);
                command.args(engine_args(&workflow_path, &working_directory, cores, frontend));

                let (status, _) =
                    run_logged(command, &self.engine_program, &working_directory).await?;
                let exit_code = status.code().unwrap_or(-1);
                if exit_code != 0 {
                    warn!("{} exited with code {}", self.engine_program, exit_code);
                }
                Ok(ExitOutcome::Engine(EngineOutcome {
                    completed: true,
                    exit_code,
                }))
            }
        }
    }
}

/// Runs a workflow with the default pipeline engine.
pub async fn execute(
    workflow_path: &Path,
    working_directory: &Path,
    kind: WorkflowKind,
    cores: Cores,
) -> Result<ExitOutcome, WorkflowError> {
    WorkflowRunner::default()
        .execute(workflow_path, working_directory, kind, cores)
        .await
}

/// Command-line arguments for the pipeline engine.
pub fn engine_args(
    snakefile: &Path,
    working_directory: &Path,
    cores: Cores,
    frontend: CondaFrontend,
) -> Vec<String> {
    vec![
        format!("--snakefile={}", snakefile.display()),
        "--use-conda".to_string(),
        format!("--cores={}", cores),
        format!("--directory={}", working_directory.display()),
        format!("--conda-frontend={}", frontend),
    ]
}

/// Spawns `command` in `working_directory`, streaming its output into the log files.
///
/// Stdout is echoed live. Both pipes are drained concurrently while the
/// process runs. Returns the exit status and the tail of stderr.
async fn run_logged(
    mut command: Command,
    program: &str,
    working_directory: &Path,
) -> Result<(ExitStatus, String), WorkflowError> {
    let stdout_log = File::create(working_directory.join(STDOUT_LOG)).await?;
    let stderr_log = File::create(working_directory.join(STDERR_LOG)).await?;

    command
        .current_dir(working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!("Running {} in {}", program, working_directory.display());
    let mut child = spawn_with_retry(&mut command).await.map_err(|source| WorkflowError::Launch {
        program: program.to_string(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let stdout_task = pump(stdout, stdout_log, true, None);
    let stderr_task = pump(stderr, stderr_log, false, Some(STDERR_TAIL_BYTES));

    let status = child.wait().await?;
    join_pump(stdout_task).await?;
    let stderr_text = join_pump(stderr_task).await?;

    debug!("{} finished with {}", program, status);
    Ok((status, stderr_text))
}

/// Freshly written scripts can briefly be busy (ETXTBSY) while another
/// thread's fork still holds a write handle.
async fn spawn_with_retry(command: &mut Command) -> io::Result<tokio::process::Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
            }
            result => return result,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_error: &io::Error) -> bool {
    false
}

/// Copies every line from `reader` into `log`.
///
/// With `tail` set, returns at most that many of the last bytes read;
/// otherwise nothing is kept and the result is empty.
fn pump<R>(
    reader: R,
    mut log: File,
    echo: bool,
    tail: Option<usize>,
) -> JoinHandle<io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut captured = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            log.write_all(&line).await?;
            if echo {
                print!("{}", String::from_utf8_lossy(&line));
            }
            if let Some(limit) = tail {
                captured.extend_from_slice(&line);
                if captured.len() > limit {
                    captured.drain(..captured.len() - limit);
                }
            }
        }
        log.flush().await?;
        Ok(String::from_utf8_lossy(&captured).into_owned())
    })
}

async fn join_pump(task: JoinHandle<io::Result<String>>) -> io::Result<String> {
    task.await.map_err(io::Error::other)?
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::other(format!("child {} was not captured", name))
}

/// Paths of the two log files inside a working directory.
pub fn log_paths(working_directory: &Path) -> [PathBuf; 2] {
    [
        working_directory.join(STDOUT_LOG),
        working_directory.join(STDERR_LOG),
    ]
}
