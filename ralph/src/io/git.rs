//! Git adapter for the loop supervisor.
//!
//! The loop only needs to read the current revision and publish the branch,
//! so we keep a small, explicit wrapper around `git` subprocess calls.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};

/// Version-control operations the loop depends on.
pub trait VersionControl {
    /// Identifier of the current revision (HEAD commit).
    fn current_revision(&self) -> Result<String>;
    /// Push `branch` to its configured remote.
    fn publish(&self, branch: &str) -> Result<()>;
    /// Push `branch`, creating the remote branch and tracking reference.
    fn publish_with_upstream(&self, branch: &str) -> Result<()>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Top-level directory of the repository containing the workdir.
    pub fn repo_root(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    fn current_revision(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    #[instrument(skip_all, fields(branch))]
    fn publish(&self, branch: &str) -> Result<()> {
        debug!(branch, "pushing branch");
        self.run_checked(&["push", "origin", branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(branch))]
    fn publish_with_upstream(&self, branch: &str) -> Result<()> {
        debug!(branch, "pushing branch with upstream");
        self.run_checked(&["push", "-u", "origin", branch])?;
        Ok(())
    }
}

static UNSAFE_BRANCH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").unwrap());

/// Turn a branch name into a filesystem-friendly slug.
///
/// Slashes become hyphens, other unsafe characters are dropped, and leading or
/// trailing hyphens are trimmed (`feat/login` -> `feat-login`).
pub fn sanitize_branch(branch: &str) -> String {
    let replaced = branch.replace('/', "-");
    UNSAFE_BRANCH_CHARS
        .replace_all(&replaced, "")
        .trim_matches('-')
        .to_string()
}
