//! Typed records of the agent's `stream-json` output.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One decoded line of the agent's output stream, keyed by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    System,
    Assistant {
        message: Option<Message>,
    },
    User {
        #[serde(default, deserialize_with = "object_or_none")]
        tool_use_result: Option<ToolUseResult>,
    },
    Result {
        #[serde(default)]
        total_cost_usd: f64,
    },
    #[serde(other)]
    Unknown,
}

/// Assistant message with its content blocks and token usage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Message {
    pub role: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Thinking blocks and anything newer than this decoder.
    #[serde(other)]
    Other,
}

/// Token usage snapshot for a single response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Tokens occupying the context window for this turn.
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }
}

/// Outcome of a tool call reported back to the model.
///
/// Sub-agent (Task) results carry non-zero `total_tokens`; regular tool
/// results leave the `total_*` fields at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolUseResult {
    pub stdout: String,
    pub status: String,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(rename = "totalDurationMs")]
    pub total_duration_ms: u64,
    #[serde(rename = "totalToolUseCount")]
    pub total_tool_use_count: u64,
}

impl ToolUseResult {
    pub fn is_subagent(&self) -> bool {
        self.total_tokens > 0
    }
}

/// Hints carried in the input of a `Task` (sub-agent dispatch) tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskHints {
    pub subagent_type: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub max_turns: Option<u64>,
}

impl TaskHints {
    /// Read hints from an opaque tool input; unexpected shapes yield no hints.
    pub fn from_input(input: &Value) -> Self {
        serde_json::from_value(input.clone()).unwrap_or_default()
    }
}

// Some tools report a bare string as their result. Only objects carry the
// fields we account for, so anything else is treated as absent instead of
// failing the whole line.
fn object_or_none<'de, D>(deserializer: D) -> Result<Option<ToolUseResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(value @ Value::Object(_)) => Ok(serde_json::from_value(value).ok()),
        _ => Ok(None),
    }
}
