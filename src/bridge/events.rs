//! Outbound protocol events.
//!
//! Every stream is a sequence of `{type, data}` objects framed as
//! server-sent events and terminated by exactly one `done`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session started (structured).
    Status,
    /// Reasoning delta (text).
    Thinking,
    /// Assistant text (text).
    Text,
    /// Tool invocation (structured).
    ToolUse,
    /// Tool completion (structured).
    ToolResult,
    /// Raw stderr from the wrapper (text).
    ToolOutput,
    /// Final run summary (structured).
    Result,
    /// Stream-level failure (text).
    Error,
    /// End of stream.
    Done,
}

impl EventKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Thinking => "thinking",
            Self::Text => "text",
            Self::ToolUse => "tool_use",
            Self::ToolResult => "tool_result",
            Self::ToolOutput => "tool_output",
            Self::Result => "result",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound event. `data` is plain text or a JSON document, by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Payload.
    pub data: String,
}

impl ProtocolEvent {
    /// Create an event with a raw payload.
    #[must_use]
    pub fn new(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Create an event whose payload is `payload` encoded as JSON.
    #[must_use]
    pub fn structured<T: Serialize>(kind: EventKind, payload: &T) -> Self {
        let data = serde_json::to_string(payload).unwrap_or_else(|e| {
            tracing::warn!(error = %e, kind = %kind, "Failed to encode event payload");
            "null".to_string()
        });
        Self { kind, data }
    }

    /// Assistant text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(EventKind::Text, text)
    }

    /// Reasoning text.
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::new(EventKind::Thinking, text)
    }

    /// Wrapper stderr.
    #[must_use]
    pub fn tool_output(text: impl Into<String>) -> Self {
        Self::new(EventKind::ToolOutput, text)
    }

    /// Stream-level error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    /// Terminal event.
    #[must_use]
    pub fn done() -> Self {
        Self::new(EventKind::Done, "")
    }

    /// Returns true if this is the terminal `done` event.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.kind == EventKind::Done
    }

    /// Decode a structured payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not JSON.
    pub fn payload(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.data)
    }

    /// The `{type, data}` object as compact JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"type":"{}","data":""}}"#, self.kind))
    }

    /// One server-sent-event frame: `data: <json>\n\n`.
    #[must_use]
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// `status` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub tools: Vec<String>,
}

/// `tool_use` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsePayload {
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
}

/// `tool_result` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub tool_use_id: Option<String>,
    pub content: String,
    pub is_error: bool,
}

/// `result` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub subtype: Option<String>,
    pub is_error: Option<bool>,
    pub duration_ms: Option<serde_json::Number>,
    pub session_id: Option<String>,
    pub usage: Value,
}
