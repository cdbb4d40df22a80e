//! Package-manager frontend selection for the pipeline engine.

use std::fmt;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

static DETECTED: OnceCell<CondaFrontend> = OnceCell::const_new();

/// Which conda frontend the pipeline engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondaFrontend {
    Mamba,
    Conda,
}

impl CondaFrontend {
    /// Returns `mamba` when it is on PATH and working, otherwise `conda`.
    ///
    /// The probe runs once per process.
    pub async fn detect() -> Self {
        *DETECTED
            .get_or_init(|| async {
                let frontend = if is_available("mamba").await {
                    CondaFrontend::Mamba
                } else {
                    CondaFrontend::Conda
                };
                debug!("Using conda frontend '{}'", frontend);
                frontend
            })
            .await
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CondaFrontend::Mamba => "mamba",
            CondaFrontend::Conda => "conda",
        }
    }
}

impl fmt::Display for CondaFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs `<program> --version`; a missing binary and a non-zero exit both count as unavailable.
pub(crate) async fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        assert!(!is_available("crunch-agent-no-such-program").await);
    }

    #[tokio::test]
    async fn test_detect_is_stable() {
        let first = CondaFrontend::detect().await;
        let second = CondaFrontend::detect().await;
        assert_eq!(first, second);
        assert!(matches!(first.as_str(), "mamba" | "conda"));
    }
}
