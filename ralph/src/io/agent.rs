//! Agent abstraction for iteration invocations.
//!
//! The [`AgentRunner`] trait decouples the loop from the actual agent backend
//! (currently `claude -p` with `stream-json` output). Tests use scripted
//! runners that replay canned event streams without spawning processes.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::core::types::Mode;
use crate::io::config::AgentConfig;
use crate::io::process::{StreamingChild, spawn_streaming};

/// Parameters for an agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    pub mode: Mode,
    /// Prompt template fed to the agent on stdin.
    pub prompt_file: PathBuf,
    /// Branch-specific implementation plan, relative to `workdir`.
    pub plan_file: PathBuf,
    /// Specs directory, relative to `workdir`.
    pub specs_dir: PathBuf,
    pub branch: String,
}

/// A running agent invocation.
pub trait AgentProcess {
    /// Raw event stream (newline-delimited JSON).
    fn stream(&mut self) -> &mut dyn Read;

    /// Wait for the agent to exit. A non-zero exit is an error.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Abstraction over agent backends.
pub trait AgentRunner {
    /// Start the agent. `cancel` must stop the underlying process promptly.
    fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AgentProcess>>;
}

/// The agent process exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentExitError {
    pub code: Option<i32>,
    pub stderr: String,
}

impl fmt::Display for AgentExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "agent exited with status {code}")?,
            None => write!(f, "agent terminated by signal")?,
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for AgentExitError {}

/// Arguments passed to the `claude` CLI for a non-interactive streamed run.
pub fn claude_args(model: &str) -> Vec<String> {
    [
        "-p",
        "--dangerously-skip-permissions",
        "--output-format=stream-json",
        "--verbose",
        "--model",
        model,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Render the prompt template with the iteration's context.
///
/// Templates may reference `mode`, `branch`, `plan_file` and `specs_dir`.
pub fn render_prompt(template: &str, request: &AgentRequest) -> Result<String> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("prompt", template)
        .context("parse prompt template")?;
    let rendered = env.get_template("prompt")?.render(context! {
        mode => request.mode.as_str(),
        branch => &request.branch,
        plan_file => request.plan_file.display().to_string(),
        specs_dir => request.specs_dir.display().to_string(),
    })?;
    Ok(rendered)
}

/// Runner that spawns the configured agent command (`claude` by default).
#[derive(Debug, Clone)]
pub struct ClaudeRunner {
    command: Vec<String>,
    model: String,
    stderr_limit_bytes: usize,
}

impl ClaudeRunner {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            command: config.command.clone(),
            model: config.model.clone(),
            stderr_limit_bytes: config.stderr_limit_bytes,
        }
    }

    fn command(&self, request: &AgentRequest) -> Result<Command> {
        let (program, extra) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(extra)
            .args(claude_args(&self.model))
            .current_dir(&request.workdir)
            .env("RALPH_MODE", request.mode.as_str())
            .env("BRANCH", &request.branch)
            .env("PLAN_FILE", &request.plan_file)
            .env("SPECS_DIR", &request.specs_dir);
        Ok(cmd)
    }
}

impl AgentRunner for ClaudeRunner {
    #[instrument(skip_all, fields(mode = %request.mode, branch = %request.branch))]
    fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AgentProcess>> {
        let template = read_prompt(&request.prompt_file)?;
        let prompt = render_prompt(&template, request)?;
        let cmd = self.command(request)?;

        info!(workdir = %request.workdir.display(), "starting agent");
        let child = spawn_streaming(
            cmd,
            Some(prompt.as_bytes()),
            self.stderr_limit_bytes,
            cancel,
        )
        .context("spawn agent")?;
        Ok(Box::new(ClaudeProcess { child }))
    }
}

struct ClaudeProcess {
    child: StreamingChild,
}

impl AgentProcess for ClaudeProcess {
    fn stream(&mut self) -> &mut dyn Read {
        self.child.stdout()
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let exit = self.child.wait().context("wait for agent")?;
        if exit.killed {
            warn!("agent was stopped before it finished");
            return Err(anyhow!("agent stopped before completion"));
        }
        if !exit.status.success() {
            warn!(exit_code = ?exit.status.code(), "agent failed");
            return Err(AgentExitError {
                code: exit.status.code(),
                stderr: String::from_utf8_lossy(&exit.stderr).trim().to_string(),
            }
            .into());
        }
        debug!("agent completed successfully");
        Ok(())
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read prompt {}", path.display()))
}
