//! Colored terminal rendering of protocol events for `run --pretty`.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde_json::Value;

use crate::bridge::{
    AgentStatus, EventKind, ProtocolEvent, ResultPayload, StatusPayload, ToolResultPayload,
    ToolUsePayload,
};

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to at most `max_len` characters, adding an ellipsis.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{head}...")
}

/// Format tool input for display, truncating long values.
#[must_use]
pub fn format_tool_input(input: &Value, raw_mode: bool) -> String {
    match input {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let value_str = match v {
                    Value::String(s) => truncate(s, 50, raw_mode),
                    other => truncate(&other.to_string(), 50, raw_mode),
                };
                format!("{k}={value_str}")
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

/// Render one event for a terminal. `done` renders as nothing.
#[must_use]
pub fn render_event(event: &ProtocolEvent, raw_mode: bool) -> Option<String> {
    match event.kind {
        EventKind::Text => Some(event.data.clone()),
        EventKind::Thinking => Some(event.data.dimmed().to_string()),
        EventKind::ToolOutput => Some(format!("{}\n", event.data.dimmed())),
        EventKind::Error => Some(format!("{} {}\n", "[ERROR]".red().bold(), event.data)),
        EventKind::Status => {
            let payload: StatusPayload = serde_json::from_str(&event.data).ok()?;
            Some(format!(
                "{} model={}, session={}\n",
                "[SESSION]".blue().bold(),
                payload.model.as_deref().unwrap_or("default").cyan(),
                truncate(payload.session_id.as_deref().unwrap_or("-"), 20, raw_mode).dimmed()
            ))
        }
        EventKind::ToolUse => {
            let payload: ToolUsePayload = serde_json::from_str(&event.data).ok()?;
            Some(format!(
                "\n{} {} ({})\n",
                "[TOOL]".cyan().bold(),
                payload.name.bold(),
                format_tool_input(&payload.input, raw_mode).dimmed()
            ))
        }
        EventKind::ToolResult => {
            let payload: ToolResultPayload = serde_json::from_str(&event.data).ok()?;
            let id = truncate(payload.tool_use_id.as_deref().unwrap_or("-"), 12, raw_mode);
            let content = truncate(&payload.content, 150, raw_mode);
            let tag = if payload.is_error {
                "[RESULT]".red().bold().to_string()
            } else {
                "[RESULT]".green().bold().to_string()
            };
            Some(format!("{tag} {} {content}\n", id.dimmed()))
        }
        EventKind::Result => {
            let payload: ResultPayload = serde_json::from_str(&event.data).ok()?;
            let duration = payload
                .duration_ms
                .map_or(String::new(), |ms| format!(" in {ms}ms"));
            let tag = if payload.is_error == Some(true) {
                "[SESSION]".red().bold().to_string()
            } else {
                "[SESSION]".blue().bold().to_string()
            };
            Some(format!(
                "\n{tag} {}{duration}\n",
                payload.subtype.as_deref().unwrap_or("completed")
            ))
        }
        EventKind::Done => None,
    }
}

/// Print one event to stdout.
pub fn print_event(event: &ProtocolEvent, raw_mode: bool) {
    if let Some(rendered) = render_event(event, raw_mode) {
        print!("{rendered}");
        let _ = io::stdout().flush();
    }
}

/// Print the agent probe result.
pub fn print_agent_status(status: &AgentStatus) {
    if status.connected {
        println!(
            "{} {} - {}",
            "[AGENT]".magenta().bold(),
            status.version.as_deref().unwrap_or("unknown").cyan(),
            "connected".green()
        );
    } else {
        println!("{} {}", "[AGENT]".magenta().bold(), "not found".red());
    }
    let _ = io::stdout().flush();
}
