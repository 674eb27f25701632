//! Tests for line-to-event translation.

use agent_bridge::bridge::{sanitize, EventKind, EventTranslator, LineAssembler, ProtocolEvent};
use serde_json::json;

fn translate_all(lines: &[&str]) -> Vec<ProtocolEvent> {
    let mut translator = EventTranslator::new();
    lines
        .iter()
        .filter_map(|line| translator.translate_line(line))
        .collect()
}

const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"sess-9","model":"gpt-5","cwd":"/w"}"#;
const DELTA_HEL: &str = r#"{"type":"assistant","timestamp_ms":1,"message":{"content":[{"type":"text","text":"Hel"}]}}"#;
const DELTA_LO: &str = r#"{"type":"assistant","timestamp_ms":2,"message":{"content":[{"type":"text","text":"lo"}]}}"#;
const FINAL_HELLO: &str = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hello"}]}}"#;

#[test]
fn system_init_becomes_status() {
    let events = translate_all(&[INIT]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Status);
    assert_eq!(
        events[0].payload().unwrap(),
        json!({"session_id": "sess-9", "model": "gpt-5", "tools": []})
    );
}

#[test]
fn thinking_delta_becomes_thinking() {
    let events = translate_all(&[r#"{"type":"thinking","subtype":"delta","text":"pondering"}"#]);
    assert_eq!(events, vec![ProtocolEvent::thinking("pondering")]);
}

#[test]
fn delta_then_final_yields_one_text() {
    let delta = r#"{"type":"assistant","timestamp_ms":1700000000000,"message":{"content":[{"type":"text","text":"Hello"}]}}"#;
    let events = translate_all(&[delta, FINAL_HELLO]);
    assert_eq!(events, vec![ProtocolEvent::text("Hello")]);
}

#[test]
fn streamed_deltas_suppress_consolidated_message() {
    let events = translate_all(&[DELTA_HEL, DELTA_LO, FINAL_HELLO]);
    assert_eq!(
        events,
        vec![ProtocolEvent::text("Hel"), ProtocolEvent::text("lo")]
    );
}

#[test]
fn consolidated_message_without_deltas_is_emitted() {
    let events = translate_all(&[FINAL_HELLO]);
    assert_eq!(events, vec![ProtocolEvent::text("Hello")]);
}

#[test]
fn suppression_resets_after_one_consolidated_message() {
    let events = translate_all(&[DELTA_HEL, FINAL_HELLO, FINAL_HELLO]);
    assert_eq!(
        events,
        vec![ProtocolEvent::text("Hel"), ProtocolEvent::text("Hello")]
    );
}

#[test]
fn tool_call_lifecycle() {
    let started = r#"{"type":"tool_call","subtype":"started","call_id":"call-1","tool_call":{"shellToolCall":{"args":{"command":"ls"}}}}"#;
    let completed = r#"{"type":"tool_call","subtype":"completed","call_id":"call-1","tool_call":{"shellToolCall":{"args":{"command":"ls"},"result":{"success":{"content":"a.rs\nb.rs"}}}}}"#;

    let events = translate_all(&[started, completed]);
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].kind, EventKind::ToolUse);
    assert_eq!(
        events[0].payload().unwrap(),
        json!({"id": "call-1", "name": "Shell", "input": {"command": "ls"}})
    );

    assert_eq!(events[1].kind, EventKind::ToolResult);
    assert_eq!(
        events[1].payload().unwrap(),
        json!({"tool_use_id": "call-1", "content": "a.rs\nb.rs", "is_error": false})
    );
}

#[test]
fn tool_error_is_flagged() {
    let completed = r#"{"type":"tool_call","subtype":"completed","call_id":"c2","tool_call":{"readToolCall":{"args":{},"result":{"error":"file not found"}}}}"#;
    let events = translate_all(&[completed]);
    let payload = events[0].payload().unwrap();
    assert_eq!(payload["content"], "file not found");
    assert_eq!(payload["is_error"], true);
}

#[test]
fn unknown_tool_kind_keeps_derived_name() {
    let started = r#"{"type":"tool_call","subtype":"started","call_id":"c3","tool_call":{"webSearchToolCall":{"args":{"q":"rust"}}}}"#;
    let events = translate_all(&[started]);
    assert_eq!(events[0].payload().unwrap()["name"], "WebSearch");
}

#[test]
fn result_carries_usage() {
    let result = r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":1234,"session_id":"sess-9","usage":{"input_tokens":10}}"#;
    let events = translate_all(&[result]);
    assert_eq!(events[0].kind, EventKind::Result);
    assert_eq!(
        events[0].payload().unwrap(),
        json!({
            "subtype": "success",
            "is_error": false,
            "duration_ms": 1234,
            "session_id": "sess-9",
            "usage": {"input_tokens": 10}
        })
    );
}

#[test]
fn garbage_lines_do_not_change_valid_events() {
    let clean = translate_all(&[INIT, DELTA_HEL, FINAL_HELLO]);

    let mut translator = EventTranslator::new();
    let mut assembler = LineAssembler::new();
    let noisy = format!(
        "\x1b[2Jsome banner\nnot json\n{INIT}\n{{\"type\":\n{DELTA_HEL}\r\n\x1b[?25l{FINAL_HELLO}\n"
    );
    let events: Vec<_> = assembler
        .push(noisy.as_bytes())
        .iter()
        .filter_map(|line| translator.translate_line(line))
        .collect();

    assert_eq!(events, clean);
}

#[test]
fn unknown_types_are_ignored() {
    let events = translate_all(&[
        r#"{"type":"user","message":{}}"#,
        r#"{"type":"system","subtype":"compact"}"#,
        r#"{"type":"tool_call","subtype":"progress","call_id":"c","tool_call":{}}"#,
    ]);
    assert!(events.is_empty());
}

#[test]
fn sanitized_line_still_parses() {
    let raw = format!("\x1b]0;agent\x07{FINAL_HELLO}\r\n");
    let line = sanitize(raw.as_bytes());
    let events = translate_all(&[line.trim_end()]);
    assert_eq!(events, vec![ProtocolEvent::text("Hello")]);
}
