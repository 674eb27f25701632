//! Messages emitted by the agent in `stream-json` mode.
//!
//! One JSON object per line, discriminated by `type` and usually `subtype`.
//! Fields are optional wherever the agent has been seen to omit them.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A decoded agent output line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Session lifecycle.
    System(SystemMessage),
    /// Reasoning stream.
    Thinking(ThinkingMessage),
    /// Assistant text, either a streamed delta or the consolidated message.
    Assistant(AssistantMessage),
    /// Tool invocation lifecycle.
    ToolCall(ToolCallMessage),
    /// Final run summary.
    Result(ResultMessage),
    /// Catch-all for unknown message types.
    #[serde(other)]
    Unknown,
}

impl AgentMessage {
    /// Parse one line of agent output.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a JSON object of a known shape.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// `system` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// `thinking` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThinkingMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// `assistant` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantMessage {
    /// Message content (flexible structure).
    #[serde(default)]
    pub message: Value,
    /// Present only on streamed deltas.
    #[serde(default)]
    pub timestamp_ms: Option<Value>,
}

impl AssistantMessage {
    /// Whether this is a streamed delta rather than the consolidated message.
    #[must_use]
    pub fn is_delta(&self) -> bool {
        self.timestamp_ms.as_ref().is_some_and(is_truthy)
    }

    /// Text of the first content block, or empty.
    #[must_use]
    pub fn text(&self) -> &str {
        self.message
            .get("content")
            .and_then(|content| content.get(0))
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// `tool_call` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
}

/// `result` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: Option<bool>,
    #[serde(default)]
    pub duration_ms: Option<serde_json::Number>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub usage: Option<Value>,
}

/// Tools the agent is known to call. The wire form is a single-key object
/// such as `{"readToolCall": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    Delete,
    Shell,
    Grep,
    Glob,
    Ls,
    UpdateTodos,
    Mcp,
    /// Any other wrapper key, kept verbatim.
    Unknown(String),
}

const TOOL_CALL_SUFFIX: &str = "ToolCall";

impl ToolKind {
    /// Map a wrapper key to a tool kind.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "readToolCall" => Self::Read,
            "writeToolCall" => Self::Write,
            "editToolCall" => Self::Edit,
            "deleteToolCall" => Self::Delete,
            "shellToolCall" => Self::Shell,
            "grepToolCall" => Self::Grep,
            "globToolCall" => Self::Glob,
            "lsToolCall" => Self::Ls,
            "updateTodosToolCall" => Self::UpdateTodos,
            "mcpToolCall" => Self::Mcp,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Human-readable tool name.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Read => "Read".to_string(),
            Self::Write => "Write".to_string(),
            Self::Edit => "Edit".to_string(),
            Self::Delete => "Delete".to_string(),
            Self::Shell => "Shell".to_string(),
            Self::Grep => "Grep".to_string(),
            Self::Glob => "Glob".to_string(),
            Self::Ls => "Ls".to_string(),
            Self::UpdateTodos => "UpdateTodos".to_string(),
            Self::Mcp => "Mcp".to_string(),
            Self::Unknown(key) => display_name_for_key(key),
        }
    }
}

/// Strip the `ToolCall` suffix and capitalize the first letter.
fn display_name_for_key(key: &str) -> String {
    let base = key.strip_suffix(TOOL_CALL_SUFFIX).unwrap_or(key);
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A tool call with its kind resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub kind: ToolKind,
    /// Arguments, `{}` when absent.
    pub args: Value,
    /// Raw result object, present on completion.
    pub result: Option<Value>,
}

/// Outcome of a completed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolCall {
    /// Name shown to users. `unknown` when the wrapper object was empty.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            ToolKind::Unknown(key) if key.is_empty() => "unknown".to_string(),
            kind => kind.display_name(),
        }
    }

    /// Extract display content from the result.
    ///
    /// A `success` object contributes its string `content` verbatim, or the
    /// whole object serialized. An `error` contributes its string or
    /// serialized form and marks the outcome as an error.
    #[must_use]
    pub fn outcome(&self) -> ToolOutcome {
        let Some(result) = self.result.as_ref().filter(|r| is_truthy(r)) else {
            return ToolOutcome {
                content: String::new(),
                is_error: false,
            };
        };

        if let Some(success) = result.get("success").filter(|s| is_truthy(s)) {
            let content = match success.get("content") {
                Some(Value::String(content)) => content.clone(),
                _ => success.to_string(),
            };
            return ToolOutcome {
                content,
                is_error: false,
            };
        }

        if let Some(error) = result.get("error").filter(|e| is_truthy(e)) {
            let content = match error {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            return ToolOutcome {
                content,
                is_error: true,
            };
        }

        ToolOutcome {
            content: result.to_string(),
            is_error: false,
        }
    }
}

#[derive(Deserialize)]
struct ToolCallBody {
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
}

impl<'de> Deserialize<'de> for ToolCall {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wrapper = Map::<String, Value>::deserialize(deserializer)?;
        let Some((key, body)) = wrapper.into_iter().next() else {
            return Ok(Self {
                kind: ToolKind::Unknown(String::new()),
                args: Value::Object(Map::new()),
                result: None,
            });
        };

        let body = match body {
            Value::Null => ToolCallBody {
                args: None,
                result: None,
            },
            other => ToolCallBody::deserialize(other).map_err(de::Error::custom)?,
        };

        Ok(Self {
            kind: ToolKind::from_key(&key),
            args: body
                .args
                .filter(|a| !a.is_null())
                .unwrap_or_else(|| Value::Object(Map::new())),
            result: body.result,
        })
    }
}

/// Loose truthiness: null, false, 0, "" are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
