//! End-to-end event stream processing against recorded agent output.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use ralph::cancel::CancellationToken;
use ralph::core::stats::{CumulativeStats, IterationStats};
use ralph::stream::{EventParser, LineTooLongError, MAX_LINE_BYTES, process_stream};

fn fixture(name: &str) -> BufReader<File> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    BufReader::new(File::open(&path).expect("open fixture"))
}

fn process(name: &str) -> (IterationStats, String) {
    let mut stats = IterationStats::default();
    let mut out = Vec::new();
    process_stream(fixture(name), &mut out, &mut stats, &CancellationToken::new())
        .expect("process");
    (stats, String::from_utf8(out).expect("utf8"))
}

#[test]
fn full_iteration_stats_and_transcript() {
    let (stats, out) = process("full_iteration.jsonl");

    assert_eq!(
        stats,
        IterationStats {
            peak_context: 44_005,
            cost: 0.4213,
            subagent_tokens: 0,
            tool_calls: 3,
        }
    );
    assert!(out.contains("Reading the plan first."));
    assert!(out.contains("· Read .ralph/plans/IMPLEMENTATION_PLAN_main.md"));
    assert!(out.contains("· Bash Run the test suite"));
    assert!(out.contains("· Grep fn main"));
    assert!(out.contains("All tests pass. Committing."));
    assert!(!out.contains('✓'));
}

#[test]
fn subagent_results_are_counted_and_rendered() {
    let (stats, out) = process("with_subagents.jsonl");

    assert_eq!(stats.peak_context, 27_010);
    assert_eq!(stats.tool_calls, 2);
    assert_eq!(stats.subagent_tokens, 10_000);
    assert_eq!(stats.cost, 0.0912);

    assert!(out.contains("▶ Explore"));
    assert!(out.contains("\"Map the storage layer\""));
    assert!(out.contains("model=sonnet"));
    assert!(out.contains("max_turns=5"));
    assert!(out.contains("▶ agent"));
    assert!(out.contains("\"Write migration\""));
    assert!(out.contains("19s · 3 tool calls · 8.7k tokens"));
    assert!(out.contains("✗ error"));
}

#[test]
fn malformed_lines_are_skipped() {
    let mut parser = EventParser::new(fixture("malformed.jsonl"));
    let events: Vec<_> = parser
        .by_ref()
        .collect::<anyhow::Result<Vec<_>>>()
        .expect("events");
    assert_eq!(events.len(), 4);
    assert_eq!(parser.skipped(), 3);

    let (stats, _out) = process("malformed.jsonl");
    assert_eq!(stats.peak_context, 7_000);
    assert_eq!(stats.tool_calls, 1);
    assert_eq!(stats.cost, 0.015);
}

#[test]
fn iterations_accumulate() {
    let mut cumulative = CumulativeStats::default();
    for name in ["full_iteration.jsonl", "with_subagents.jsonl", "malformed.jsonl"] {
        let (stats, _out) = process(name);
        cumulative.update(&stats);
    }

    assert_eq!(cumulative.iterations, 3);
    assert_eq!(cumulative.peak_context, 44_005);
    assert_eq!(cumulative.subagent_tokens, 10_000);
    assert!((cumulative.total_cost - (0.4213 + 0.0912 + 0.015)).abs() < 1e-9);
}

#[test]
fn oversized_line_fails_the_stream() {
    let mut raw = String::from("{\"type\":\"result\",\"total_cost_usd\":0.1}\n");
    raw.push_str(&"x".repeat(MAX_LINE_BYTES + 10));
    raw.push('\n');

    let mut stats = IterationStats::default();
    let err = process_stream(
        Cursor::new(raw),
        Vec::new(),
        &mut stats,
        &CancellationToken::new(),
    )
    .expect_err("too long");

    assert!(err.downcast_ref::<LineTooLongError>().is_some());
    // Events before the broken line were still folded.
    assert_eq!(stats.cost, 0.1);
}
