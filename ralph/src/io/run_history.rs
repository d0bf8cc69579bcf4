//! Persisted history of completed loop runs (`.ralph/state.json`).
//!
//! The store is a single JSON document rewritten on every run. There is no
//! locking: two loops sharing one store can lose each other's records.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Mode, RunStatus};

/// Summary of one finished loop run. Never modified after it is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: u32,
    pub total_cost: f64,
    pub peak_context: u64,
    pub subagent_tokens: u64,
    pub status: RunStatus,
    /// Raw iteration logs, in iteration order.
    pub log_files: Vec<String>,
}

/// All recorded runs, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunHistory {
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl RunHistory {
    pub fn last_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }
}

/// Load run history from disk; a missing file is an empty history.
pub fn load_history(path: &Path) -> Result<RunHistory> {
    debug!(path = %path.display(), "loading run history");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunHistory::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("read run history {}", path.display()));
        }
    };
    let history: RunHistory = serde_json::from_str(&contents)
        .with_context(|| format!("parse run history {}", path.display()))?;
    debug!(runs = history.runs.len(), "run history loaded");
    Ok(history)
}

/// Atomically write run history to disk (temp file + rename).
pub fn save_history(path: &Path, history: &RunHistory) -> Result<()> {
    debug!(path = %path.display(), runs = history.runs.len(), "writing run history");
    let mut buf = serde_json::to_string_pretty(history)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Load, append `record`, and save.
pub fn append_run(path: &Path, record: RunRecord) -> Result<()> {
    let mut history = load_history(path)?;
    history.runs.push(record);
    save_history(path, &history)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run history path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run history {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace run history {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(status: RunStatus, cost: f64) -> RunRecord {
        let started_at = Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
            .single()
            .expect("timestamp");
        RunRecord {
            mode: Mode::Plan,
            started_at,
            finished_at: started_at + chrono::Duration::seconds(95),
            iterations: 3,
            total_cost: cost,
            peak_context: 50_000,
            subagent_tokens: 1_200,
            status,
            log_files: vec![
                ".ralph/logs/20250301-093000.jsonl".to_string(),
                ".ralph/logs/20250301-093040.jsonl".to_string(),
            ],
        }
    }

    #[test]
    fn missing_file_is_empty_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let history = load_history(&temp.path().join("state.json")).expect("load");
        assert_eq!(history, RunHistory::default());
        assert!(history.last_run().is_none());
    }

    /// Verifies write → read preserves every record field.
    #[test]
    fn history_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".ralph/state.json");
        let history = RunHistory {
            runs: vec![
                record(RunStatus::MaxIterations, 1.23),
                record(RunStatus::Cancelled, 0.5),
            ],
        };

        save_history(&path, &history).expect("save");
        assert_eq!(load_history(&path).expect("load"), history);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn append_keeps_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        append_run(&path, record(RunStatus::StaleAbort, 1.0)).expect("append");
        append_run(&path, record(RunStatus::Completed, 2.0)).expect("append");

        let history = load_history(&path).expect("load");
        assert_eq!(history.runs.len(), 2);
        assert_eq!(
            history.last_run().map(|run| run.status),
            Some(RunStatus::Completed)
        );
    }

    #[test]
    fn serialized_record_uses_stable_field_names() {
        let json = serde_json::to_value(record(RunStatus::StaleAbort, 0.25)).expect("serialize");
        assert_eq!(json["mode"], "plan");
        assert_eq!(json["status"], "stale_abort");
        assert_eq!(json["started_at"], "2025-03-01T09:30:00Z");
        assert_eq!(json["log_files"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn corrupt_history_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "{ not json").expect("write");
        assert!(load_history(&path).is_err());
    }
}
