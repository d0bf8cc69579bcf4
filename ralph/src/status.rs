//! `ralph status`: plan progress, last run and spend so far.

use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::io::run_history::RunRecord;
use crate::stream::{Event, EventParser};
use crate::style::{DIM, GREEN, RESET};

static TASK_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^###\s+Task\s+\d+\s*[-–—]+\s*(.+)").unwrap());

/// One `### Task N -- Title` section of an implementation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTask {
    pub title: String,
    /// State of the last checkbox seen under the heading.
    pub done: bool,
}

/// Cost recovered from one raw iteration log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedIteration {
    pub started_at: DateTime<Utc>,
    /// Collision suffix (`-<n>`) for logs started in the same second; 0 when absent.
    pub sequence: u32,
    pub path: PathBuf,
    pub cost: f64,
}

/// Parse plan tasks. A missing plan yields no tasks.
pub fn parse_plan(path: &Path) -> Result<Vec<PlanTask>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read plan {}", path.display())),
    };

    let mut tasks: Vec<PlanTask> = Vec::new();
    for line in contents.lines() {
        if let Some(caps) = TASK_HEADING.captures(line) {
            tasks.push(PlanTask {
                title: caps[1].trim().to_string(),
                done: false,
            });
            continue;
        }
        let trimmed = line.trim();
        let done = if trimmed.starts_with("- [x]") || trimmed.starts_with("- [X]") {
            true
        } else if trimmed.starts_with("- [ ]") {
            false
        } else {
            continue;
        };
        if let Some(task) = tasks.last_mut() {
            task.done = done;
        }
    }
    Ok(tasks)
}

/// Scan a logs directory for `<YYYYMMDD-HHMMSS>[-n].jsonl` files, oldest first.
///
/// Files with unrecognised names or unreadable contents are skipped.
pub fn scan_logs(logs_dir: &Path) -> Result<Vec<LoggedIteration>> {
    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read logs dir {}", logs_dir.display()));
        }
    };

    let mut logged = Vec::new();
    for entry in entries {
        let path = entry.context("read logs dir entry")?.path();
        let Some((started_at, sequence)) = log_name(&path) else {
            continue;
        };
        match log_cost(&path) {
            Ok(cost) => logged.push(LoggedIteration {
                started_at,
                sequence,
                path,
                cost,
            }),
            Err(err) => debug!(err = %err, path = %path.display(), "skipping unreadable log"),
        }
    }
    logged.sort_by_key(|logged| (logged.started_at, logged.sequence));
    Ok(logged)
}

/// Start time and collision suffix encoded in a log file name.
fn log_name(path: &Path) -> Option<(DateTime<Utc>, u32)> {
    if path.extension()? != "jsonl" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let stamp = stem.get(..15)?;
    let sequence = match &stem[15..] {
        "" => 0,
        suffix => suffix.strip_prefix('-')?.parse::<u32>().ok()?,
    };
    let started_at = NaiveDateTime::parse_from_str(stamp, "%Y%m%d-%H%M%S")
        .ok()?
        .and_utc();
    Some((started_at, sequence))
}

fn log_cost(path: &Path) -> Result<f64> {
    let file = File::open(path).with_context(|| format!("open log {}", path.display()))?;
    for event in EventParser::new(BufReader::new(file)) {
        if let Event::Result { total_cost_usd } = event? {
            if total_cost_usd > 0.0 {
                return Ok(total_cost_usd);
            }
        }
    }
    Ok(0.0)
}

/// Everything `ralph status` prints.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub project: String,
    pub branch: String,
    pub tasks: Vec<PlanTask>,
    pub logged: Vec<LoggedIteration>,
    pub last_run: Option<RunRecord>,
}

pub fn render_status<W: Write + ?Sized>(out: &mut W, report: &StatusReport) -> io::Result<()> {
    writeln!(out, "Project: {}", report.project)?;
    writeln!(out, "Branch:  {}", report.branch)?;

    if !report.tasks.is_empty() {
        let done = report.tasks.iter().filter(|task| task.done).count();
        let pct = done * 100 / report.tasks.len();
        writeln!(
            out,
            "\nTasks:  {done}/{} complete ({pct}%)",
            report.tasks.len()
        )?;
        for task in &report.tasks {
            if task.done {
                writeln!(out, "  {GREEN}✓{RESET} {}", task.title)?;
            } else {
                writeln!(out, "  {DIM}·{RESET} {}", task.title)?;
            }
        }
    }

    if let Some(run) = &report.last_run {
        writeln!(
            out,
            "\nLast run:   {} ({}, {} iterations, {})",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.mode,
            run.iterations,
            run.status
        )?;
    } else if let Some(last) = report.logged.last() {
        writeln!(out, "\nLast run:   {}", last.started_at.format("%Y-%m-%d %H:%M"))?;
    }

    if !report.logged.is_empty() {
        let total: f64 = report.logged.iter().map(|logged| logged.cost).sum();
        writeln!(
            out,
            "Total cost: ${total:.4} across {} iterations",
            report.logged.len()
        )?;
    }
    Ok(())
}
