//! Terminal classification of a run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a stage or of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunResult {
    Success,
    Fail,
}

impl RunResult {
    pub fn is_success(self) -> bool {
        self == RunResult::Success
    }

    pub fn is_fail(self) -> bool {
        self == RunResult::Fail
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::Success => write!(f, "SUCCESS"),
            RunResult::Fail => write!(f, "FAIL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_display() {
        assert_eq!(RunResult::Success.to_string(), "SUCCESS");
        assert_eq!(RunResult::Fail.to_string(), "FAIL");
        assert!(RunResult::Fail.is_fail());
        assert_eq!(serde_json::to_string(&RunResult::Success).unwrap(), "\"SUCCESS\"");
    }
}
