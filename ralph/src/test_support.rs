//! Scripted collaborators for driving the loop without `claude` or `git`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::cancel::CancellationToken;
use crate::core::types::Mode;
use crate::io::agent::{AgentExitError, AgentProcess, AgentRequest, AgentRunner};
use crate::io::git::VersionControl;
use crate::looping::LoopOptions;

/// Loop options rooted at `root` with the default `.ralph/` layout.
pub fn loop_options(root: &Path, mode: Mode) -> LoopOptions {
    LoopOptions {
        mode,
        workdir: root.to_path_buf(),
        prompt_file: format!(".ralph/prompts/{mode}.md").into(),
        plan_file: ".ralph/plans/IMPLEMENTATION_PLAN_main.md".into(),
        specs_dir: "specs/main".into(),
        branch: "main".to_string(),
        max_iterations: 0,
        max_stale: 2,
        logs_dir: ".ralph/logs".into(),
        state_file: ".ralph/state.json".into(),
    }
}

/// One canned agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    /// Raw bytes the agent writes to stdout.
    pub stream: Vec<u8>,
    /// Raise the cancellation token once this many bytes were read, then
    /// end the stream as a killed agent would.
    pub cancel_after_bytes: Option<usize>,
    /// Non-zero exit code reported by `finish`.
    pub exit_code: Option<i32>,
    /// Fail the invocation before any output.
    pub start_error: Option<String>,
}

impl ScriptedRun {
    pub fn stream(events: impl Into<String>) -> Self {
        Self {
            stream: events.into().into_bytes(),
            ..Self::default()
        }
    }

    pub fn cancel_after(mut self, bytes: usize) -> Self {
        self.cancel_after_bytes = Some(bytes);
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

/// [`AgentRunner`] that replays [`ScriptedRun`]s in order.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    runs: RefCell<VecDeque<ScriptedRun>>,
    repeat: Option<ScriptedRun>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            ..Self::default()
        }
    }

    /// Replays `run` for every invocation.
    pub fn repeating(run: ScriptedRun) -> Self {
        Self {
            repeat: Some(run),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl AgentRunner for ScriptedAgent {
    fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AgentProcess>> {
        self.requests.borrow_mut().push(request.clone());
        let run = match self.runs.borrow_mut().pop_front() {
            Some(run) => run,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| anyhow!("no scripted agent runs left"))?,
        };
        if let Some(err) = run.start_error {
            return Err(anyhow!(err));
        }
        Ok(Box::new(ScriptedProcess {
            reader: CancellingReader {
                inner: Cursor::new(run.stream),
                cancel_after: run.cancel_after_bytes,
                cancel: cancel.clone(),
            },
            exit_code: run.exit_code,
        }))
    }
}

struct ScriptedProcess {
    reader: CancellingReader,
    exit_code: Option<i32>,
}

impl AgentProcess for ScriptedProcess {
    fn stream(&mut self) -> &mut dyn Read {
        &mut self.reader
    }

    fn finish(self: Box<Self>) -> Result<()> {
        if self.reader.cancel_after.is_some() && self.reader.cancel.is_cancelled() {
            return Err(anyhow!("agent stopped before completion"));
        }
        match self.exit_code {
            Some(code) if code != 0 => Err(AgentExitError {
                code: Some(code),
                stderr: "scripted failure".to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

struct CancellingReader {
    inner: Cursor<Vec<u8>>,
    cancel_after: Option<usize>,
    cancel: CancellationToken,
}

impl Read for CancellingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(limit) = self.cancel_after else {
            return self.inner.read(buf);
        };
        let pos = usize::try_from(self.inner.position()).unwrap_or(usize::MAX);
        if pos >= limit {
            self.cancel.cancel();
            return Ok(0);
        }
        let take = buf.len().min(limit - pos);
        self.inner.read(&mut buf[..take])
    }
}

/// [`VersionControl`] with scripted revisions and push results.
#[derive(Debug, Default)]
pub struct ScriptedVcs {
    revisions: RefCell<VecDeque<String>>,
    last: RefCell<String>,
    advancing: bool,
    counter: Cell<u32>,
    push_fails: bool,
    upstream_fails: bool,
    revision_error: Option<String>,
    pushes: RefCell<Vec<String>>,
    upstream_pushes: RefCell<Vec<String>>,
}

impl ScriptedVcs {
    /// Returns the given revisions in order, then repeats the last one.
    pub fn with_revisions(revisions: &[&str]) -> Self {
        Self {
            revisions: RefCell::new(revisions.iter().map(|r| (*r).to_string()).collect()),
            ..Self::default()
        }
    }

    /// Every read returns the same revision (no commits ever land).
    pub fn constant(revision: &str) -> Self {
        Self::with_revisions(&[revision])
    }

    /// Every read returns a new revision.
    pub fn advancing() -> Self {
        Self {
            advancing: true,
            ..Self::default()
        }
    }

    pub fn failing_push(mut self) -> Self {
        self.push_fails = true;
        self
    }

    pub fn failing_upstream(mut self) -> Self {
        self.upstream_fails = true;
        self
    }

    pub fn failing_revision(mut self, message: &str) -> Self {
        self.revision_error = Some(message.to_string());
        self
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.borrow().clone()
    }

    pub fn upstream_pushes(&self) -> Vec<String> {
        self.upstream_pushes.borrow().clone()
    }

    pub fn revision_reads(&self) -> u32 {
        self.counter.get()
    }
}

impl VersionControl for ScriptedVcs {
    fn current_revision(&self) -> Result<String> {
        if let Some(message) = &self.revision_error {
            return Err(anyhow!(message.clone()));
        }
        let n = self.counter.get() + 1;
        self.counter.set(n);
        if self.advancing {
            return Ok(format!("rev-{n}"));
        }
        if let Some(next) = self.revisions.borrow_mut().pop_front() {
            *self.last.borrow_mut() = next;
        }
        Ok(self.last.borrow().clone())
    }

    fn publish(&self, branch: &str) -> Result<()> {
        self.pushes.borrow_mut().push(branch.to_string());
        if self.push_fails {
            return Err(anyhow!("git push origin {branch}: rejected"));
        }
        Ok(())
    }

    fn publish_with_upstream(&self, branch: &str) -> Result<()> {
        self.upstream_pushes.borrow_mut().push(branch.to_string());
        if self.upstream_fails {
            return Err(anyhow!("git push -u origin {branch}: no remote"));
        }
        Ok(())
    }
}
