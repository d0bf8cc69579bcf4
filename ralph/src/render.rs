//! Loop-level terminal output: header, iteration banners, summaries.
//!
//! Event-level output lives in [`crate::stream::render`]; this module frames it.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::core::stats::{CumulativeStats, IterationStats};
use crate::core::types::Mode;
use crate::stream::format_tokens;
use crate::style::{
    BOLD_BLUE, BOLD_CYAN, BOLD_GREEN, BOLD_RED, BOLD_WHITE, BOLD_YELLOW, DIM, MAGENTA, RESET,
    WHITE, YELLOW,
};

/// Context window the percentages are measured against.
pub const CONTEXT_LIMIT: u64 = 200_000;

const BAR: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const BANNER_WIDTH: usize = 38;

fn mode_color(mode: Mode) -> &'static str {
    match mode {
        Mode::Plan => BOLD_CYAN,
        Mode::Build => BOLD_GREEN,
    }
}

/// Configuration bar printed once before the first iteration.
pub fn render_header<W: Write + ?Sized>(
    out: &mut W,
    mode: Mode,
    prompt_file: &Path,
    branch: &str,
    max_iterations: u32,
) -> io::Result<()> {
    let color = mode_color(mode);
    writeln!(out, "{BOLD_BLUE}{BAR}{RESET}")?;
    writeln!(out, "  {DIM}Mode{RESET}     {color}{mode}{RESET}")?;
    writeln!(
        out,
        "  {DIM}Prompt{RESET}   {WHITE}{}{RESET}",
        prompt_file.display()
    )?;
    writeln!(out, "  {DIM}Branch{RESET}   {BOLD_CYAN}{branch}{RESET}")?;
    if max_iterations > 0 {
        writeln!(
            out,
            "  {DIM}Max{RESET}      {WHITE}{max_iterations} iterations{RESET}"
        )?;
    }
    writeln!(out, "{BOLD_BLUE}{BAR}{RESET}")
}

/// Boxed `PLAN #n` / `BUILD #n` banner that opens each iteration.
pub fn render_banner<W: Write + ?Sized>(out: &mut W, mode: Mode, iteration: u32) -> io::Result<()> {
    let color = mode_color(mode);
    let label = mode.label();
    let inner = format!("  {label}  #{iteration}");
    let pad = " ".repeat(BANNER_WIDTH.saturating_sub(inner.chars().count()));

    writeln!(out)?;
    writeln!(
        out,
        "  {color}╔══════════════════════════════════════╗{RESET}"
    )?;
    writeln!(
        out,
        "  {color}║{RESET}  {color}{label}{RESET}  {BOLD_WHITE}#{iteration}{RESET}{pad}{color}║{RESET}"
    )?;
    writeln!(
        out,
        "  {color}╚══════════════════════════════════════╝{RESET}"
    )?;
    writeln!(out)
}

/// Context/cost line plus the raw log location for one iteration.
pub fn render_iteration_summary<W: Write + ?Sized>(
    out: &mut W,
    stats: &IterationStats,
    log_path: &Path,
) -> io::Result<()> {
    let pct = stats.peak_context * 100 / CONTEXT_LIMIT;
    write!(
        out,
        "\n  {DIM}────{RESET} {} / {} context ({pct}%)",
        format_tokens(stats.peak_context),
        format_tokens(CONTEXT_LIMIT)
    )?;
    if stats.cost > 0.0 {
        write!(out, "  {MAGENTA}${:.4}{RESET}", stats.cost)?;
    }
    writeln!(out)?;
    writeln!(out, "  {DIM}raw log: {}{RESET}", log_path.display())
}

pub fn render_stale_warning<W: Write + ?Sized>(
    out: &mut W,
    count: u32,
    threshold: u32,
) -> io::Result<()> {
    writeln!(
        out,
        "{BOLD_YELLOW}No new commits this iteration{RESET} {DIM}(stale: {count}/{threshold}){RESET}"
    )
}

pub fn render_stale_abort<W: Write + ?Sized>(out: &mut W, threshold: u32) -> io::Result<()> {
    writeln!(
        out,
        "{BOLD_RED}Stale loop detected:{RESET} {threshold} consecutive iterations with no commits. Stopping."
    )
}

pub fn render_max_iterations<W: Write + ?Sized>(out: &mut W, max: u32) -> io::Result<()> {
    writeln!(out, "{BOLD_YELLOW}Reached max iterations: {max}{RESET}")
}

pub fn render_cancelled<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{BOLD_YELLOW}Interrupted. Stopping.{RESET}")
}

pub fn render_push_fallback<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{YELLOW}Failed to push. Creating remote branch...{RESET}")
}

pub fn render_push_failed<W: Write + ?Sized>(out: &mut W, err: &anyhow::Error) -> io::Result<()> {
    writeln!(out, "{BOLD_RED}Push failed:{RESET} {err:#}")
}

pub fn render_history_error<W: Write + ?Sized>(out: &mut W, err: &anyhow::Error) -> io::Result<()> {
    writeln!(out, "{BOLD_RED}Failed to save run history:{RESET} {err:#}")
}

/// Final `JOB SUMMARY` box.
pub fn render_summary_box<W: Write + ?Sized>(
    out: &mut W,
    stats: &CumulativeStats,
    wall_time: Duration,
) -> io::Result<()> {
    #[allow(clippy::cast_precision_loss)]
    let pct = stats.peak_context as f64 / CONTEXT_LIMIT as f64 * 100.0;
    let peak = format!(
        "{} / {} ({pct:.0}%)",
        format_tokens(stats.peak_context),
        format_tokens(CONTEXT_LIMIT)
    );

    writeln!(out, "┌──────────────────────────────────────────┐")?;
    writeln!(out, "│             JOB SUMMARY                  │")?;
    writeln!(out, "├──────────────────────────────────────────┤")?;
    writeln!(out, "│  Iterations       {:<23}│", stats.iterations)?;
    writeln!(out, "│  Wall time        {:<23}│", format_duration(wall_time))?;
    writeln!(out, "│  Peak context     {peak:<23}│")?;
    writeln!(
        out,
        "│  Subagent tokens  {:<23}│",
        format_tokens(stats.subagent_tokens)
    )?;
    writeln!(out, "│  Total cost       ${:<22.4}│", stats.total_cost)?;
    writeln!(out, "└──────────────────────────────────────────┘")
}

/// `"<minutes>m <seconds>s"`, truncated to whole seconds.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn header_shows_max_only_when_bounded() {
        let bounded = rendered(|out| {
            render_header(out, Mode::Build, Path::new("PROMPT_build.md"), "main", 20)
        });
        assert!(bounded.contains("Mode"));
        assert!(bounded.contains(&format!("{BOLD_GREEN}build{RESET}")));
        assert!(bounded.contains("PROMPT_build.md"));
        assert!(bounded.contains(&format!("{BOLD_CYAN}main{RESET}")));
        assert!(bounded.contains("20 iterations"));
        assert_eq!(bounded.matches(BAR).count(), 2);

        let unbounded =
            rendered(|out| render_header(out, Mode::Plan, Path::new("p.md"), "dev", 0));
        assert!(!unbounded.contains("Max"));
        assert!(unbounded.contains(&format!("{BOLD_CYAN}plan{RESET}")));
    }

    #[test]
    fn banner_labels_iteration() {
        let out = rendered(|out| render_banner(out, Mode::Plan, 3));
        assert!(out.contains(&format!("{BOLD_CYAN}PLAN{RESET}")));
        assert!(out.contains(&format!("{BOLD_WHITE}#3{RESET}")));
        assert!(out.contains("╔"));
        assert!(out.contains("╝"));
    }

    #[test]
    fn iteration_summary_with_cost() {
        let stats = IterationStats {
            peak_context: 85_234,
            cost: 0.0234,
            ..IterationStats::default()
        };
        let out =
            rendered(|out| render_iteration_summary(out, &stats, Path::new(".ralph/logs/a.jsonl")));
        assert!(out.contains("85.2k / 200.0k context (42%)"));
        assert!(out.contains("$0.0234"));
        assert!(out.contains("raw log: .ralph/logs/a.jsonl"));
    }

    #[test]
    fn iteration_summary_hides_zero_cost() {
        let stats = IterationStats::default();
        let out = rendered(|out| render_iteration_summary(out, &stats, Path::new("x.jsonl")));
        assert!(out.contains("0 / 200.0k context (0%)"));
        assert!(!out.contains('$'));
    }

    #[test]
    fn loop_messages() {
        let stale = rendered(|out| render_stale_warning(out, 1, 2));
        assert!(stale.contains("No new commits this iteration"));
        assert!(stale.contains("(stale: 1/2)"));

        let abort = rendered(|out| render_stale_abort(out, 2));
        assert!(abort.contains("2 consecutive iterations with no commits. Stopping."));

        let max = rendered(|out| render_max_iterations(out, 5));
        assert!(max.contains("Reached max iterations: 5"));

        let push = rendered(|out| render_push_fallback(out));
        assert!(push.contains("Failed to push. Creating remote branch..."));
    }

    #[test]
    fn summary_box_lines() {
        let stats = CumulativeStats {
            iterations: 3,
            peak_context: 100_000,
            subagent_tokens: 12_345,
            total_cost: 1.5,
        };
        let out = rendered(|out| render_summary_box(out, &stats, Duration::from_secs(125)));
        assert!(out.contains("JOB SUMMARY"));
        assert!(out.contains(&format!("│  Iterations       {:<23}│", 3)));
        assert!(out.contains("2m 5s"));
        assert!(out.contains("100.0k / 200.0k (50%)"));
        assert!(out.contains("12.3k"));
        assert!(out.contains("$1.5000"));
    }

    #[test]
    fn summary_box_rows_align() {
        let stats = CumulativeStats::default();
        let out = rendered(|out| render_summary_box(out, &stats, Duration::ZERO));
        let widths: Vec<usize> = out.lines().map(|line| line.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{widths:?}");
    }

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0m 0s");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "0m 59s");
        assert_eq!(format_duration(Duration::from_secs(3_661)), "61m 1s");
    }
}
