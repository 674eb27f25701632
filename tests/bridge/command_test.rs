//! Tests for request preparation and argument construction.

use std::ffi::OsStr;
use std::path::PathBuf;

use agent_bridge::bridge::{
    AgentBridge, AgentCommandBuilder, FileAttachment, PermissionMode, SpawnStrategyKind,
    StreamRequest,
};
use agent_bridge::config::BridgeConfig;

fn bridge() -> AgentBridge {
    let mut config = BridgeConfig::default();
    config.agent.binary = Some(PathBuf::from("/opt/agent/bin/agent"));
    config.agent.spawn_strategy = SpawnStrategyKind::Direct;
    AgentBridge::new(config)
}

#[test]
fn build_args_full_order() {
    let args = AgentCommandBuilder::new("hello", "/work")
        .resume("sess-1")
        .model("gpt-5")
        .permission_mode(PermissionMode::Plan)
        .build_args();

    assert_eq!(
        args,
        vec![
            "--print",
            "--output-format",
            "stream-json",
            "--stream-partial-output",
            "--trust",
            "--workspace",
            "/work",
            "--resume",
            "sess-1",
            "--model",
            "gpt-5",
            "--mode",
            "plan",
            "hello",
        ]
    );
}

#[test]
fn build_args_default_mode_asks() {
    let args = AgentCommandBuilder::new("hello", "/work")
        .permission_mode(PermissionMode::Default)
        .build_args();

    let mode = args.iter().position(|a| a == "--mode").unwrap();
    assert_eq!(args[mode + 1], "ask");
    assert_eq!(args.last().map(String::as_str), Some("hello"));
}

#[test]
fn build_args_are_deterministic() {
    let request = StreamRequest::new("hi")
        .model("m")
        .resume("s")
        .system_prompt("be brief");
    let prepared = Default::default();

    let first = AgentCommandBuilder::from_request(&request, "/w", &prepared).build_args();
    let second = AgentCommandBuilder::from_request(&request, "/w", &prepared).build_args();
    assert_eq!(first, second);
}

#[test]
fn empty_optional_fields_are_omitted() {
    let request = StreamRequest::new("hi").model("").resume("").system_prompt("");
    let args = AgentCommandBuilder::from_request(&request, "/w", &Default::default()).build_args();

    assert!(!args.iter().any(|a| a == "--model" || a == "--resume"));
    assert_eq!(args.last().map(String::as_str), Some("hi"));
}

#[tokio::test]
async fn prepare_materializes_attachments_and_composes_prompt() {
    let work = tempfile::tempdir().unwrap();
    let request = StreamRequest::new("Summarize it")
        .working_directory(work.path())
        .system_prompt("You are terse")
        .permission_mode("plan")
        .attach(FileAttachment::inline("notes.txt", "text/plain", "aGVsbG8="))
        .attach(FileAttachment::inline("shot.png", "image/png", "iVBORw0KGgo="));

    let spec = bridge().prepare(&request).await.unwrap();

    assert_eq!(spec.program, PathBuf::from("/opt/agent/bin/agent"));
    assert_eq!(spec.cwd, work.path());
    assert_eq!(
        spec.env.get(OsStr::new("TERM")).map(|v| v.to_os_string()),
        Some("dumb".into())
    );

    let prompt = spec.args.last().unwrap();
    assert!(prompt.starts_with(
        "[System context: You are terse]\n\n[Note: 1 image(s) were attached but cannot be displayed in CLI mode.]\n\n[User attached file: "
    ));
    assert!(prompt.ends_with(
        "(notes.txt)]\n\nPlease read the attached file(s) above, then respond to the user's message:\n\nSummarize it"
    ));

    let uploads: Vec<_> = std::fs::read_dir(work.path().join(".agent-uploads"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].to_string_lossy().ends_with("-notes.txt"));
    assert_eq!(std::fs::read_to_string(&uploads[0]).unwrap(), "hello");
}

#[tokio::test]
async fn prepare_fails_on_bad_base64() {
    let work = tempfile::tempdir().unwrap();
    let request = StreamRequest::new("x")
        .working_directory(work.path())
        .attach(FileAttachment::inline("a.txt", "text/plain", "!!!not base64"));

    assert!(bridge().prepare(&request).await.is_err());
}

#[tokio::test]
async fn prepare_accepts_unpadded_and_wrapped_base64() {
    let work = tempfile::tempdir().unwrap();
    let request = StreamRequest::new("x")
        .working_directory(work.path())
        .attach(FileAttachment::inline("a.txt", "text/plain", "aGVsbG8gd29y\nbGQ"));

    let spec = bridge().prepare(&request).await.unwrap();
    assert!(spec.args.last().unwrap().contains("(a.txt)]"));

    let uploads: Vec<_> = std::fs::read_dir(work.path().join(".agent-uploads"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(uploads.len(), 1);
    assert_eq!(std::fs::read_to_string(&uploads[0]).unwrap(), "hello world");
}
