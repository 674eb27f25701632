//! Agent message to protocol event translation.

use serde_json::Value;

use super::events::{
    EventKind, ProtocolEvent, ResultPayload, StatusPayload, ToolResultPayload, ToolUsePayload,
};
use super::messages::{AgentMessage, AssistantMessage, ToolCallMessage};
use super::sanitize::sanitize;

/// Stateful translator for one stream.
///
/// The agent sends assistant text twice: once as timestamped deltas and
/// once as a consolidated message without a timestamp. After any delta the
/// next consolidated message is dropped. This assumes one assistant turn
/// in flight per stream.
#[derive(Debug, Default)]
pub struct EventTranslator {
    delta_seen: bool,
}

impl EventTranslator {
    /// Create a translator with no deltas seen.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one assembled output line.
    ///
    /// Lines that are not JSON objects of a known shape are dropped.
    pub fn translate_line(&mut self, line: &str) -> Option<ProtocolEvent> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            if !trimmed.is_empty() {
                tracing::trace!(line = %trimmed, "Skipping non-JSON output line");
            }
            return None;
        }

        match AgentMessage::parse(trimmed) {
            Ok(message) => self.translate(message),
            Err(e) => {
                tracing::trace!(error = %e, line = %trimmed, "Skipping undecodable output line");
                None
            }
        }
    }

    /// Translate one decoded message.
    pub fn translate(&mut self, message: AgentMessage) -> Option<ProtocolEvent> {
        match message {
            AgentMessage::System(system) if system.subtype.as_deref() == Some("init") => {
                Some(ProtocolEvent::structured(
                    EventKind::Status,
                    &StatusPayload {
                        session_id: system.session_id,
                        model: system.model,
                        tools: Vec::new(),
                    },
                ))
            }
            AgentMessage::Thinking(thinking) if thinking.subtype.as_deref() == Some("delta") => {
                thinking
                    .text
                    .filter(|text| !text.is_empty())
                    .map(ProtocolEvent::thinking)
            }
            AgentMessage::Assistant(assistant) => self.translate_assistant(&assistant),
            AgentMessage::ToolCall(call) => translate_tool_call(call),
            AgentMessage::Result(result) => Some(ProtocolEvent::structured(
                EventKind::Result,
                &ResultPayload {
                    subtype: result.subtype,
                    is_error: result.is_error,
                    duration_ms: result.duration_ms,
                    session_id: result.session_id,
                    usage: result.usage.unwrap_or(Value::Null),
                },
            )),
            _ => None,
        }
    }

    fn translate_assistant(&mut self, assistant: &AssistantMessage) -> Option<ProtocolEvent> {
        if assistant.is_delta() {
            self.delta_seen = true;
        } else if self.delta_seen {
            self.delta_seen = false;
            return None;
        }

        let text = assistant.text();
        (!text.is_empty()).then(|| ProtocolEvent::text(text))
    }

    /// Whether a delta has been streamed since the last consolidated message.
    #[must_use]
    pub fn delta_seen(&self) -> bool {
        self.delta_seen
    }
}

fn translate_tool_call(call: ToolCallMessage) -> Option<ProtocolEvent> {
    let tool_call = call.tool_call?;

    match call.subtype.as_deref() {
        Some("started") => Some(ProtocolEvent::structured(
            EventKind::ToolUse,
            &ToolUsePayload {
                id: call.call_id,
                name: tool_call.name(),
                input: tool_call.args,
            },
        )),
        Some("completed") => {
            let outcome = tool_call.outcome();
            Some(ProtocolEvent::structured(
                EventKind::ToolResult,
                &ToolResultPayload {
                    tool_use_id: call.call_id,
                    content: outcome.content,
                    is_error: outcome.is_error,
                },
            ))
        }
        _ => None,
    }
}

/// `tool_output` for a chunk of wrapper stderr, if anything survives
/// sanitizing.
#[must_use]
pub fn stderr_event(raw: &[u8]) -> Option<ProtocolEvent> {
    let cleaned = sanitize(raw);
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| ProtocolEvent::tool_output(cleaned))
}

/// `error` for an abnormal exit code. Signal deaths carry no code and are
/// not reported.
#[must_use]
pub fn exit_event(code: Option<i32>) -> Option<ProtocolEvent> {
    match code {
        Some(code) if code != 0 => Some(ProtocolEvent::error(format!(
            "Agent process exited with code {code}"
        ))),
        _ => None,
    }
}

/// `error` for a process that never started.
#[must_use]
pub fn spawn_failure_event(err: &impl std::fmt::Display) -> ProtocolEvent {
    ProtocolEvent::error(format!("Failed to start agent: {err}"))
}
