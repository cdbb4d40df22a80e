//! Workflow flavours and engine concurrency.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a project's workflow is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// A shell script run directly.
    Script,
    /// A Snakefile run by the pipeline engine.
    #[default]
    #[serde(rename = "snakemake")]
    Pipeline,
}

impl WorkflowKind {
    /// File name of the materialized workflow inside `.crunch/`.
    pub fn artifact_name(self) -> &'static str {
        match self {
            WorkflowKind::Script => "script.sh",
            WorkflowKind::Pipeline => "Snakefile",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::Script => write!(f, "script"),
            WorkflowKind::Pipeline => write!(f, "snakemake"),
        }
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "script" | "shell" => Ok(WorkflowKind::Script),
            "snakemake" | "pipeline" => Ok(WorkflowKind::Pipeline),
            other => Err(format!(
                "unknown workflow type '{}', expected 'script' or 'snakemake'",
                other
            )),
        }
    }
}

/// Concurrency handed to the pipeline engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cores {
    /// Every available core.
    All,
    /// A fixed number of cores.
    Count(NonZeroUsize),
}

impl Default for Cores {
    fn default() -> Self {
        Cores::Count(NonZeroUsize::MIN)
    }
}

impl fmt::Display for Cores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cores::All => write!(f, "all"),
            Cores::Count(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for Cores {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Cores::All);
        }
        s.parse::<NonZeroUsize>()
            .map(Cores::Count)
            .map_err(|_| format!("invalid core count '{}', expected 'all' or a positive integer", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("script".parse::<WorkflowKind>().unwrap(), WorkflowKind::Script);
        assert_eq!("Snakemake".parse::<WorkflowKind>().unwrap(), WorkflowKind::Pipeline);
        assert!("make".parse::<WorkflowKind>().is_err());
    }

    #[test]
    fn test_kind_artifact_name() {
        assert_eq!(WorkflowKind::Script.artifact_name(), "script.sh");
        assert_eq!(WorkflowKind::Pipeline.artifact_name(), "Snakefile");
        assert_eq!(WorkflowKind::default(), WorkflowKind::Pipeline);
    }

    #[test]
    fn test_cores_parse_and_display() {
        assert_eq!("all".parse::<Cores>().unwrap(), Cores::All);
        assert_eq!("4".parse::<Cores>().unwrap().to_string(), "4");
        assert_eq!(Cores::All.to_string(), "all");
        assert_eq!(Cores::default().to_string(), "1");
        assert!("0".parse::<Cores>().is_err());
        assert!("many".parse::<Cores>().is_err());
    }
}
