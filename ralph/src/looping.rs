//! The iteration supervisor behind `ralph loop`.
//!
//! Each iteration invokes the agent once, drains its event stream through the
//! parser and transcript, publishes the branch, and feeds the post-iteration
//! revision to the stale detector. Exactly one [`RunRecord`] is persisted for
//! every run that reaches a terminal state.

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::core::stale::StaleDetector;
use crate::core::stats::{CumulativeStats, IterationStats};
use crate::core::types::{Mode, RunStatus};
use crate::io::agent::{AgentRequest, AgentRunner};
use crate::io::git::VersionControl;
use crate::io::iteration_log::IterationLog;
use crate::io::run_history::{RunRecord, append_run};
use crate::render;
use crate::stream::process_stream;

/// Inputs for one `ralph loop` run. Relative paths resolve against `workdir`.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub mode: Mode,
    pub workdir: PathBuf,
    pub prompt_file: PathBuf,
    pub plan_file: PathBuf,
    pub specs_dir: PathBuf,
    pub branch: String,
    /// `0` means unbounded.
    pub max_iterations: u32,
    /// `<= 0` means the default threshold.
    pub max_stale: i64,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
}

impl LoopOptions {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    fn request(&self) -> AgentRequest {
        AgentRequest {
            workdir: self.workdir.clone(),
            mode: self.mode,
            prompt_file: self.resolve(&self.prompt_file),
            plan_file: self.plan_file.clone(),
            specs_dir: self.specs_dir.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// Summary of a finished loop run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub status: RunStatus,
    pub stats: CumulativeStats,
    /// The record handed to the run history (persisted unless saving failed).
    pub record: RunRecord,
    /// Set when the run record could not be saved.
    pub history_error: Option<String>,
}

/// How a single agent invocation ended.
struct IterationEnd {
    log_path: PathBuf,
    /// Cancellation was observed during the invocation.
    cancelled: bool,
}

/// Run the agent repeatedly until the budget is spent, progress stalls, or
/// `cancel` fires.
///
/// Transport failures (unreadable stream, agent exiting non-zero on its own,
/// failing to read the revision) abort the run with an error and are not
/// recorded in the run history.
#[instrument(skip_all, fields(mode = %options.mode, branch = %options.branch))]
pub fn run_loop<A: AgentRunner, V: VersionControl, W: Write>(
    options: &LoopOptions,
    agent: &A,
    vcs: &V,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<LoopOutcome> {
    let clock = Instant::now();
    let started_at = Utc::now();
    let mut detector = StaleDetector::new(options.max_stale);
    let mut cumulative = CumulativeStats::default();
    let mut log_files = Vec::new();

    render::render_header(
        out,
        options.mode,
        &options.prompt_file,
        &options.branch,
        options.max_iterations,
    )
    .context("write transcript")?;

    let mut iteration = 0u32;
    let status = loop {
        if options.max_iterations > 0 && iteration >= options.max_iterations {
            render::render_max_iterations(out, options.max_iterations)
                .context("write transcript")?;
            break RunStatus::MaxIterations;
        }
        if cancel.is_cancelled() {
            render::render_cancelled(out).context("write transcript")?;
            break RunStatus::Cancelled;
        }
        iteration += 1;

        let before = vcs
            .current_revision()
            .context("read revision before iteration")?;
        if iteration == 1 {
            detector.check(&before);
        }
        debug!(iteration, revision = %before, "starting iteration");
        render::render_banner(out, options.mode, iteration).context("write transcript")?;

        let mut stats = IterationStats::default();
        let end = run_iteration(options, agent, cancel, out, &mut stats)
            .with_context(|| format!("iteration {iteration}"))?;
        log_files.push(display_path(&options.workdir, &end.log_path));

        if end.cancelled {
            info!(iteration, "iteration cancelled");
            cumulative.update(&stats);
            render::render_iteration_summary(out, &stats, &end.log_path)
                .context("write transcript")?;
            render::render_cancelled(out).context("write transcript")?;
            break RunStatus::Cancelled;
        }

        publish(vcs, &options.branch, out)?;

        cumulative.update(&stats);
        render::render_iteration_summary(out, &stats, &end.log_path)
            .context("write transcript")?;

        let after = vcs
            .current_revision()
            .context("read revision after iteration")?;
        let check = detector.check(&after);
        debug!(iteration, revision = %after, stale_count = check.stale_count, "iteration done");
        if check.abort {
            render::render_stale_abort(out, detector.max_stale()).context("write transcript")?;
            break RunStatus::StaleAbort;
        }
        if check.stale_count > 0 {
            render::render_stale_warning(out, check.stale_count, detector.max_stale())
                .context("write transcript")?;
        }
    };

    let record = RunRecord {
        mode: options.mode,
        started_at,
        finished_at: Utc::now(),
        iterations: cumulative.iterations,
        total_cost: cumulative.total_cost,
        peak_context: cumulative.peak_context,
        subagent_tokens: cumulative.subagent_tokens,
        status,
        log_files,
    };
    info!(%status, iterations = record.iterations, "loop finished");

    let state_file = options.resolve(&options.state_file);
    let history_error = match append_run(&state_file, record.clone()) {
        Ok(()) => None,
        Err(err) => {
            warn!(err = %format!("{err:#}"), path = %state_file.display(), "failed to save run history");
            render::render_history_error(out, &err).context("write transcript")?;
            Some(format!("{err:#}"))
        }
    };

    writeln!(out).context("write transcript")?;
    render::render_summary_box(out, &cumulative, clock.elapsed()).context("write transcript")?;

    Ok(LoopOutcome {
        status,
        stats: cumulative,
        record,
        history_error,
    })
}

/// Invoke the agent once, teeing its raw stream into a fresh iteration log.
fn run_iteration<A: AgentRunner, W: Write>(
    options: &LoopOptions,
    agent: &A,
    cancel: &CancellationToken,
    out: &mut W,
    stats: &mut IterationStats,
) -> Result<IterationEnd> {
    let mut log = IterationLog::create(&options.resolve(&options.logs_dir), Utc::now())?;
    let log_path = log.path().to_path_buf();

    let mut process = agent
        .invoke(&options.request(), cancel)
        .context("start agent")?;
    let drained = {
        let mut tee = log.tee(process.stream());
        process_stream(BufReader::new(&mut tee), &mut *out, stats, cancel)
    };

    if let Err(err) = drained {
        if cancel.is_cancelled() {
            debug!(err = %err, "stream error after cancellation");
            return Ok(IterationEnd {
                log_path,
                cancelled: true,
            });
        }
        // Dropping the process kills the agent.
        return Err(err.context("read agent event stream"));
    }

    let finished = process.finish();
    if cancel.is_cancelled() {
        if let Err(err) = finished {
            debug!(err = %err, "agent exit after cancellation");
        }
        return Ok(IterationEnd {
            log_path,
            cancelled: true,
        });
    }
    finished?;
    Ok(IterationEnd {
        log_path,
        cancelled: false,
    })
}

/// Push the branch, creating the upstream if a plain push fails.
///
/// A failed fallback is reported and the run continues.
fn publish<V: VersionControl, W: Write>(vcs: &V, branch: &str, out: &mut W) -> Result<()> {
    let Err(err) = vcs.publish(branch) else {
        return Ok(());
    };
    warn!(err = %format!("{err:#}"), branch, "push failed, retrying with upstream");
    render::render_push_fallback(out).context("write transcript")?;

    if let Err(err) = vcs.publish_with_upstream(branch) {
        warn!(err = %format!("{err:#}"), branch, "push with upstream failed");
        render::render_push_failed(out, &err).context("write transcript")?;
    }
    Ok(())
}

fn display_path(workdir: &Path, path: &Path) -> String {
    path.strip_prefix(workdir)
        .unwrap_or(path)
        .display()
        .to_string()
}
