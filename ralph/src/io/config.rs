//! Project configuration stored at `.ralph/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::core::types::Mode;
use crate::io::git::sanitize_branch;

/// Upper bound on a phase's `max_iterations`.
pub const MAX_ITERATIONS_LIMIT: u32 = 100;

/// Ralph configuration (TOML).
///
/// Edited by humans. Missing fields fall back to defaults, so an empty file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RalphConfig {
    /// Informational project name.
    pub project: String,
    pub agent: AgentConfig,
    #[serde(rename = "loop")]
    pub looping: LoopConfig,
    pub phases: Phases,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable plus leading arguments (e.g. `["claude"]`).
    pub command: Vec<String>,
    pub model: String,
    /// Truncate captured agent stderr beyond this many bytes.
    pub stderr_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            model: "opus".to_string(),
            stderr_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Consecutive commit-less iterations before aborting. `<= 0` means 2.
    pub max_stale: i64,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
    /// Shared specs directory. Unset means `specs/<sanitized branch>`.
    pub specs_dir: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_stale: 2,
            logs_dir: PathBuf::from(".ralph/logs"),
            state_file: PathBuf::from(".ralph/state.json"),
            specs_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Phases {
    pub plan: PhaseConfig,
    pub build: PhaseConfig,
}

impl Default for Phases {
    fn default() -> Self {
        Self {
            plan: PhaseConfig {
                prompt: PathBuf::from(".ralph/prompts/plan.md"),
                output: Some(PathBuf::from(".ralph/plans/")),
                max_iterations: 5,
            },
            build: PhaseConfig {
                prompt: PathBuf::from(".ralph/prompts/build.md"),
                output: None,
                max_iterations: 20,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PhaseConfig {
    pub prompt: PathBuf,
    /// Where plans are written. A trailing `/` marks a directory.
    pub output: Option<PathBuf>,
    /// `0` means unbounded.
    pub max_iterations: u32,
}

impl RalphConfig {
    /// Fill phase fields a partial `[phases.*]` table left empty.
    pub fn apply_defaults(&mut self) {
        let defaults = Phases::default();
        for (phase, default) in [
            (&mut self.phases.plan, defaults.plan),
            (&mut self.phases.build, defaults.build),
        ] {
            if phase.prompt.as_os_str().is_empty() {
                phase.prompt = default.prompt;
            }
            if phase.output.is_none() {
                phase.output = default.output;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, phase) in [("plan", &self.phases.plan), ("build", &self.phases.build)] {
            if phase.max_iterations > MAX_ITERATIONS_LIMIT {
                return Err(anyhow!(
                    "phases.{name}.max_iterations must be <= {MAX_ITERATIONS_LIMIT} (got {})",
                    phase.max_iterations
                ));
            }
            if phase.prompt.as_os_str().is_empty() {
                return Err(anyhow!("phases.{name}.prompt must not be empty"));
            }
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.stderr_limit_bytes == 0 {
            return Err(anyhow!("agent.stderr_limit_bytes must be > 0"));
        }
        if self.looping.logs_dir.as_os_str().is_empty() {
            return Err(anyhow!("loop.logs_dir must not be empty"));
        }
        if self.looping.state_file.as_os_str().is_empty() {
            return Err(anyhow!("loop.state_file must not be empty"));
        }
        Ok(())
    }

    pub fn phase(&self, mode: Mode) -> &PhaseConfig {
        match mode {
            Mode::Plan => &self.phases.plan,
            Mode::Build => &self.phases.build,
        }
    }

    /// Path of the implementation plan for `branch`.
    ///
    /// A directory output (`.ralph/plans/`) yields
    /// `.ralph/plans/IMPLEMENTATION_PLAN_<branch>.md`; a file output
    /// (`PLAN.md`) yields `PLAN_<branch>.md`.
    pub fn plan_path_for_branch(&self, branch: &str) -> PathBuf {
        let sanitized = sanitize_branch(branch);
        let output = self
            .phases
            .plan
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(".ralph/plans/"));
        let raw = output.to_string_lossy();

        if raw.ends_with('/') {
            return output.join(format!("IMPLEMENTATION_PLAN_{sanitized}.md"));
        }
        let stem = output
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match output.extension() {
            Some(ext) => format!("{stem}_{sanitized}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{sanitized}"),
        };
        output.with_file_name(name)
    }

    /// Specs directory for `branch`: `loop.specs_dir` when set, otherwise
    /// `specs/<sanitized branch>`.
    pub fn specs_dir_for_branch(&self, branch: &str) -> PathBuf {
        match &self.looping.specs_dir {
            Some(dir) => dir.clone(),
            None => Path::new("specs").join(sanitize_branch(branch)),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.apply_defaults();
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
