//! Shared types for the loop supervisor.
//!
//! These types define stable contracts between the loop, the run history and
//! the CLI. Their serialized forms are persisted in `.ralph/state.json`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which prompt/phase the loop is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Plan,
    Build,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Build => "build",
        }
    }

    /// Upper-case label used in iteration banners.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Plan => "PLAN",
            Mode::Build => "BUILD",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run finished without hitting a limit (not produced by the
    /// supervisor itself today, but part of the persisted vocabulary).
    Completed,
    /// Consecutive iterations produced no new revision.
    StaleAbort,
    /// Cooperative cancellation was observed at an iteration boundary.
    Cancelled,
    /// The configured iteration budget was exhausted.
    MaxIterations,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::StaleAbort => "stale_abort",
            RunStatus::Cancelled => "cancelled",
            RunStatus::MaxIterations => "max_iterations",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::StaleAbort).expect("serialize");
        assert_eq!(json, "\"stale_abort\"");
        let parsed: RunStatus = serde_json::from_str("\"max_iterations\"").expect("parse");
        assert_eq!(parsed, RunStatus::MaxIterations);
    }

    #[test]
    fn mode_labels() {
        assert_eq!(Mode::Plan.label(), "PLAN");
        assert_eq!(Mode::Build.to_string(), "build");
    }
}
