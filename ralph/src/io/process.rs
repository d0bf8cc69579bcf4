//! Helpers for running the agent subprocess with a streamed stdout.

use std::io::{Read, Write};
use std::process::{ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancellationToken;

/// How often the watcher thread re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Exit information for a finished child.
#[derive(Debug)]
pub struct ChildExit {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
    /// True when the child was killed because of cancellation or abandonment.
    pub killed: bool,
}

type OutputHandle = thread::JoinHandle<Result<(Vec<u8>, usize)>>;
type WatcherHandle = thread::JoinHandle<Result<(ExitStatus, bool)>>;

/// A running child whose stdout is consumed incrementally by the caller.
///
/// A watcher thread owns the child: it reaps it when it exits on its own and
/// kills it when the cancellation token fires or this handle is dropped
/// without [`StreamingChild::wait`].
pub struct StreamingChild {
    stdout: ChildStdout,
    stderr_handle: Option<OutputHandle>,
    watcher: Option<WatcherHandle>,
    abandon: Arc<AtomicBool>,
}

impl StreamingChild {
    pub fn stdout(&mut self) -> &mut ChildStdout {
        &mut self.stdout
    }

    /// Wait for the child to exit and collect its stderr.
    pub fn wait(mut self) -> Result<ChildExit> {
        let watcher = self
            .watcher
            .take()
            .ok_or_else(|| anyhow!("child already waited"))?;
        let (status, killed) = match watcher.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("child watcher thread panicked")),
        };
        let stderr_handle = self
            .stderr_handle
            .take()
            .ok_or_else(|| anyhow!("stderr already collected"))?;
        let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;
        if stderr_truncated > 0 {
            warn!(stderr_truncated, "stderr truncated");
        }
        debug!(exit_code = ?status.code(), killed, "child finished");
        Ok(ChildExit {
            status,
            stderr,
            stderr_truncated,
            killed,
        })
    }
}

impl Drop for StreamingChild {
    fn drop(&mut self) {
        self.abandon.store(true, Ordering::SeqCst);
    }
}

/// Spawn `cmd` with stdout piped back to the caller.
///
/// `stdin` is written in full and then closed. Stderr is drained on a
/// background thread and bounded by `stderr_limit_bytes`.
#[instrument(skip_all, fields(stderr_limit_bytes))]
pub fn spawn_streaming(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    stderr_limit_bytes: usize,
    cancel: &CancellationToken,
) -> Result<StreamingChild> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(err) = child_stdin.write_all(input) {
            warn!(err = %err, "failed to write child stdin, stopping child");
            drop(child_stdin);
            let _ = child.kill();
            let _ = child.wait();
            return Err(err).context("write stdin");
        }
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, stderr_limit_bytes));

    let abandon = Arc::new(AtomicBool::new(false));
    let watcher_abandon = Arc::clone(&abandon);
    let cancel = cancel.clone();
    let watcher = thread::spawn(move || -> Result<(ExitStatus, bool)> {
        loop {
            if let Some(status) = child.wait_timeout(CANCEL_POLL).context("wait for child")? {
                return Ok((status, false));
            }
            if cancel.is_cancelled() || watcher_abandon.load(Ordering::SeqCst) {
                warn!("stopping child process");
                child.kill().context("kill child")?;
                let status = child.wait().context("wait child after kill")?;
                return Ok((status, true));
            }
        }
    });

    Ok(StreamingChild {
        stdout,
        stderr_handle: Some(stderr_handle),
        watcher: Some(watcher),
        abandon,
    })
}

fn join_output(handle: OutputHandle) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
