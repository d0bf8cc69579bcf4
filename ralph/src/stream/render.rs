//! Human-readable transcript of agent events.

use std::io::{self, Write};

use serde_json::Value;

use super::event::{ContentBlock, Event, Message, TaskHints, ToolUseResult};
use crate::style::{BOLD, BOLD_CYAN, BOLD_RED, DIM, GREEN, RESET, WHITE};

/// Input keys tried, in order, when summarising a tool call in one line.
const PARAM_KEYS: [&str; 7] = [
    "file_path",
    "description",
    "command",
    "pattern",
    "query",
    "url",
    "skill",
];

const PARAM_MAX_CHARS: usize = 60;

/// Format a token count for display (`"45.3k"`, `"1.5M"`).
///
/// Values are floored to one decimal, never rounded up.
pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        let tenths = n / 100_000;
        format!("{}.{}M", tenths / 10, tenths % 10)
    } else if n >= 1_000 {
        let tenths = n / 100;
        format!("{}.{}k", tenths / 10, tenths % 10)
    } else {
        n.to_string()
    }
}

/// Pick one representative parameter from a tool's input.
pub fn extract_param(input: &Value) -> String {
    let Some(object) = input.as_object() else {
        return String::new();
    };
    let picked = PARAM_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string);
    let text = picked.unwrap_or_else(|| {
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys.join(", ")
    });
    truncate_chars(&text, PARAM_MAX_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Writes the transcript for a sequence of events.
///
/// System, result and unknown events are intentionally silent.
pub struct Transcript<W> {
    out: W,
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::Assistant {
                message: Some(message),
            } => self.render_message(message),
            Event::User {
                tool_use_result: Some(result),
            } if result.is_subagent() => self.render_subagent_result(result),
            _ => Ok(()),
        }
    }

    fn render_message(&mut self, message: &Message) -> io::Result<()> {
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => {
                    writeln!(self.out, "{BOLD}{WHITE}{text}{RESET}")?;
                }
                ContentBlock::ToolUse { name, input, .. } if name == "Task" => {
                    self.render_task(&TaskHints::from_input(input))?;
                }
                ContentBlock::ToolUse { name, input, .. } => {
                    let param = extract_param(input);
                    if param.is_empty() {
                        writeln!(self.out, "  {DIM}· {name}{RESET}")?;
                    } else {
                        writeln!(self.out, "  {DIM}· {name} {param}{RESET}")?;
                    }
                }
                ContentBlock::Other => {}
            }
        }
        Ok(())
    }

    fn render_task(&mut self, hints: &TaskHints) -> io::Result<()> {
        let agent = hints.subagent_type.as_deref().unwrap_or("agent");
        let description = hints.description.as_deref().unwrap_or("—");
        write!(
            self.out,
            "  {BOLD_CYAN}▶ {agent}{RESET} \"{description}\""
        )?;
        if let Some(model) = &hints.model {
            write!(self.out, " {DIM}model={model}{RESET}")?;
        }
        if let Some(max_turns) = hints.max_turns {
            write!(self.out, " {DIM}max_turns={max_turns}{RESET}")?;
        }
        writeln!(self.out)
    }

    fn render_subagent_result(&mut self, result: &ToolUseResult) -> io::Result<()> {
        if result.status == "completed" {
            let secs = (result.total_duration_ms + 500) / 1000;
            writeln!(
                self.out,
                "  {GREEN}✓{RESET} {DIM}{secs}s · {} tool calls · {} tokens{RESET}",
                result.total_tool_use_count,
                format_tokens(result.total_tokens)
            )
        } else {
            let status = if result.status.is_empty() {
                "unknown"
            } else {
                result.status.as_str()
            };
            writeln!(self.out, "  {BOLD_RED}✗ {status}{RESET}")
        }
    }
}
