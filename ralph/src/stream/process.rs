//! Single-pass stats folding and transcript rendering.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use super::event::{ContentBlock, Event};
use super::parser::EventParser;
use super::render::Transcript;
use crate::cancel::CancellationToken;
use crate::core::stats::IterationStats;

/// Fold one event into the iteration stats.
pub fn fold_event(stats: &mut IterationStats, event: &Event) {
    match event {
        Event::Assistant {
            message: Some(message),
        } => {
            if let Some(usage) = &message.usage {
                stats.observe_context(usage.context_tokens());
            }
            for block in &message.content {
                if matches!(block, ContentBlock::ToolUse { .. }) {
                    stats.observe_tool_use();
                }
            }
        }
        Event::User {
            tool_use_result: Some(result),
        } if result.is_subagent() => stats.observe_subagent(result.total_tokens),
        Event::Result { total_cost_usd } => stats.observe_result(*total_cost_usd),
        _ => {}
    }
}

/// Drain `reader`, folding every event into `stats` and rendering it to `out`.
///
/// Stops early (without error) once `cancel` fires. `stats` holds whatever
/// was accumulated even when an error is returned.
#[instrument(skip_all)]
pub fn process_stream<R: BufRead, W: Write>(
    reader: R,
    out: W,
    stats: &mut IterationStats,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut parser = EventParser::new(reader);
    let mut transcript = Transcript::new(out);
    let mut events = 0u64;

    for event in parser.by_ref() {
        if cancel.is_cancelled() {
            debug!(events, "cancelled while draining event stream");
            break;
        }
        let event = event?;
        events += 1;
        fold_event(stats, &event);
        transcript.render(&event).context("render transcript")?;
    }

    debug!(events, skipped = parser.skipped(), "event stream drained");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(input: &str) -> (IterationStats, String) {
        let mut stats = IterationStats::default();
        let mut out = Vec::new();
        process_stream(
            Cursor::new(input.as_bytes().to_vec()),
            &mut out,
            &mut stats,
            &CancellationToken::new(),
        )
        .expect("process");
        (stats, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn folds_context_and_cost() {
        let input = concat!(
            r#"{"type":"assistant","message":{"role":"assistant","model":"m","content":[],"usage":{"input_tokens":100,"output_tokens":3,"cache_creation_input_tokens":20,"cache_read_input_tokens":5}}}"#,
            "\n",
            r#"{"type":"result","total_cost_usd":0.05}"#,
            "\n",
        );
        let (stats, _) = run(input);
        assert_eq!(stats.peak_context, 125);
        assert_eq!(stats.cost, 0.05);
        assert_eq!(stats.tool_calls, 0);
    }

    #[test]
    fn counts_tools_and_subagent_tokens() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"a","name":"Bash","input":{"command":"ls"}},{"type":"tool_use","id":"b","name":"Task","input":{"subagent_type":"Explore","description":"look"}}]}}"#,
            "\n",
            r#"{"type":"user","tool_use_result":{"stdout":"file.rs"}}"#,
            "\n",
            r#"{"type":"user","tool_use_result":{"status":"completed","totalTokens":1200,"totalDurationMs":2000,"totalToolUseCount":2}}"#,
            "\n",
        );
        let (stats, out) = run(input);
        assert_eq!(stats.tool_calls, 2);
        assert_eq!(stats.subagent_tokens, 1_200);
        assert!(out.contains("· Bash ls"));
        assert!(out.contains("▶ Explore"));
        assert!(out.contains("1.2k tokens"));
    }

    #[test]
    fn empty_stream_leaves_stats_untouched() {
        let (stats, out) = run("");
        assert_eq!(stats, IterationStats::default());
        assert!(out.is_empty());
    }

    #[test]
    fn cancelled_token_stops_before_next_event() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stats = IterationStats::default();
        process_stream(
            Cursor::new(b"{\"type\":\"result\",\"total_cost_usd\":2.0}\n".to_vec()),
            Vec::new(),
            &mut stats,
            &cancel,
        )
        .expect("process");
        assert_eq!(stats.cost, 0.0);
    }
}
