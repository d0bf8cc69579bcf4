//! `ralph`: run an autonomous coding agent in a supervised loop.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use ralph::cancel::CancellationToken;
use ralph::core::types::{Mode, RunStatus};
use ralph::exit_codes;
use ralph::io::agent::ClaudeRunner;
use ralph::io::config::{MAX_ITERATIONS_LIMIT, RalphConfig, load_config};
use ralph::io::git::Git;
use ralph::io::run_history::load_history;
use ralph::logging;
use ralph::looping::{LoopOptions, run_loop};
use ralph::status::{StatusReport, parse_plan, render_status, scan_logs};

const CONFIG_PATH: &str = ".ralph/config.toml";

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Run an autonomous coding agent in a supervised loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke the agent repeatedly until the budget is spent or commits stop.
    Loop {
        #[arg(value_enum)]
        mode: Mode,
        /// Maximum iterations (0 uses the phase default from config).
        #[arg(long, default_value_t = 0)]
        max: u32,
        /// Repository root (defaults to the repository containing the cwd).
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Show plan progress, the last run and total spend.
    Status {
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Loop { mode, max, root } => cmd_loop(mode, max, root),
        Command::Status { root } => cmd_status(root),
    }
}

fn cmd_loop(mode: Mode, max: u32, root: Option<PathBuf>) -> Result<i32> {
    let root = resolve_root(root)?;
    let config = load_config(&root.join(CONFIG_PATH))?;
    let git = Git::new(root.clone());
    let branch = git.current_branch()?;
    let options = loop_options(&config, mode, max, &root, branch)?;

    let cancel = CancellationToken::new();
    cancel.register_sigint()?;
    let agent = ClaudeRunner::new(&config.agent);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = run_loop(&options, &agent, &git, &cancel, &mut out)?;
    out.flush().context("flush stdout")?;

    Ok(exit_code(outcome.status, &cancel))
}

/// An interrupt always surfaces as `CANCELLED`, even when the run had already
/// reached another terminal state.
fn exit_code(status: RunStatus, cancel: &CancellationToken) -> i32 {
    if status == RunStatus::Cancelled || cancel.is_cancelled() {
        exit_codes::CANCELLED
    } else {
        exit_codes::OK
    }
}

fn loop_options(
    config: &RalphConfig,
    mode: Mode,
    max: u32,
    root: &Path,
    branch: String,
) -> Result<LoopOptions> {
    let phase = config.phase(mode);
    let max_iterations = if max > 0 { max } else { phase.max_iterations };
    if max_iterations > MAX_ITERATIONS_LIMIT {
        bail!("--max must be <= {MAX_ITERATIONS_LIMIT} (got {max_iterations})");
    }
    Ok(LoopOptions {
        mode,
        workdir: root.to_path_buf(),
        prompt_file: phase.prompt.clone(),
        plan_file: config.plan_path_for_branch(&branch),
        specs_dir: config.specs_dir_for_branch(&branch),
        branch,
        max_iterations,
        max_stale: config.looping.max_stale,
        logs_dir: config.looping.logs_dir.clone(),
        state_file: config.looping.state_file.clone(),
    })
}

fn cmd_status(root: Option<PathBuf>) -> Result<i32> {
    let root = resolve_root(root)?;
    let config = load_config(&root.join(CONFIG_PATH))?;
    let git = Git::new(root.clone());
    let branch = match git.current_branch() {
        Ok(branch) => branch,
        Err(err) => {
            debug!(err = %err, "no current branch");
            "HEAD".to_string()
        }
    };

    let project = if config.project.is_empty() {
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        config.project.clone()
    };
    let report = StatusReport {
        project,
        tasks: parse_plan(&root.join(config.plan_path_for_branch(&branch)))?,
        logged: scan_logs(&root.join(&config.looping.logs_dir))?,
        last_run: load_history(&root.join(&config.looping.state_file))?
            .last_run()
            .cloned(),
        branch,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    render_status(&mut out, &report).context("write status")?;
    Ok(exit_codes::OK)
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let start = match root {
        Some(root) => root,
        None => std::env::current_dir().context("read current directory")?,
    };
    Git::new(start.clone())
        .repo_root()
        .with_context(|| format!("{} is not inside a git repository", start.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_loop() {
        let cli = Cli::parse_from(["ralph", "loop", "build"]);
        assert!(matches!(
            cli.command,
            Command::Loop {
                mode: Mode::Build,
                max: 0,
                root: None
            }
        ));
    }

    #[test]
    fn parse_loop_with_max_and_root() {
        let cli = Cli::parse_from(["ralph", "loop", "plan", "--max", "3", "--root", "/tmp/x"]);
        match cli.command {
            Command::Loop { mode, max, root } => {
                assert_eq!(mode, Mode::Plan);
                assert_eq!(max, 3);
                assert_eq!(root, Some(PathBuf::from("/tmp/x")));
            }
            Command::Status { .. } => panic!("expected loop"),
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["ralph", "loop", "deploy"]).is_err());
    }

    #[test]
    fn zero_max_uses_phase_default() {
        let config = RalphConfig::default();
        let options = loop_options(&config, Mode::Plan, 0, Path::new("/repo"), "main".into())
            .expect("options");
        assert_eq!(options.max_iterations, 5);
        assert_eq!(
            options.plan_file,
            PathBuf::from(".ralph/plans/IMPLEMENTATION_PLAN_main.md")
        );
        assert_eq!(options.prompt_file, PathBuf::from(".ralph/prompts/plan.md"));
    }

    #[test]
    fn branch_scopes_plan_and_specs() {
        let config = RalphConfig::default();
        let options = loop_options(
            &config,
            Mode::Build,
            0,
            Path::new("/repo"),
            "feature/login".into(),
        )
        .expect("options");
        assert_eq!(options.specs_dir, PathBuf::from("specs/feature-login"));
        assert_eq!(
            options.plan_file,
            PathBuf::from(".ralph/plans/IMPLEMENTATION_PLAN_feature-login.md")
        );
        assert_eq!(options.branch, "feature/login");
    }

    #[test]
    fn interrupt_wins_over_other_terminal_states() {
        let cancel = CancellationToken::new();
        assert_eq!(exit_code(RunStatus::MaxIterations, &cancel), exit_codes::OK);
        assert_eq!(exit_code(RunStatus::StaleAbort, &cancel), exit_codes::OK);
        assert_eq!(
            exit_code(RunStatus::Cancelled, &cancel),
            exit_codes::CANCELLED
        );

        cancel.cancel();
        assert_eq!(
            exit_code(RunStatus::MaxIterations, &cancel),
            exit_codes::CANCELLED
        );
    }

    #[test]
    fn explicit_max_over_limit_is_rejected() {
        let config = RalphConfig::default();
        assert!(loop_options(&config, Mode::Build, 101, Path::new("/repo"), "main".into()).is_err());
        let options = loop_options(&config, Mode::Build, 100, Path::new("/repo"), "main".into())
            .expect("options");
        assert_eq!(options.max_iterations, 100);
    }
}
