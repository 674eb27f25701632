//! Tests for the per-stream driver against real child processes.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use agent_bridge::bridge::{
    stream_launch, DirectSpawn, EventKind, LaunchSpec, ProtocolEvent, SpawnStrategy,
};
#[cfg(target_os = "linux")]
use agent_bridge::bridge::LinuxScript;
use futures_util::StreamExt;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const GRACE: Duration = Duration::from_millis(500);
const LIMIT: Duration = Duration::from_secs(10);

fn direct() -> Arc<dyn SpawnStrategy> {
    Arc::new(DirectSpawn)
}

fn sh(script: &str) -> LaunchSpec {
    LaunchSpec::new(
        "sh",
        vec!["-c".to_string(), script.to_string()],
        std::env::temp_dir(),
    )
}

async fn collect(stream: ReceiverStream<ProtocolEvent>) -> Vec<ProtocolEvent> {
    timeout(LIMIT, stream.collect::<Vec<_>>())
        .await
        .expect("stream did not finish")
}

fn assert_terminates(events: &[ProtocolEvent]) {
    let dones = events.iter().filter(|e| e.is_done()).count();
    let errors = events.iter().filter(|e| e.kind == EventKind::Error).count();
    assert_eq!(dones, 1, "exactly one done: {events:?}");
    assert!(events.last().is_some_and(ProtocolEvent::is_done));
    assert!(errors <= 1, "at most one error: {events:?}");
}

#[tokio::test]
async fn clean_exit_emits_content_then_done() {
    let script = r#"
        echo '{"type":"system","subtype":"init","session_id":"s1","model":"m"}'
        echo 'Script started, banner noise'
        printf '{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"}]}}'
    "#;
    let events = collect(stream_launch(direct(), sh(script), CancellationToken::new(), GRACE)).await;

    assert_terminates(&events);
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Status, EventKind::Text, EventKind::Done]);
    assert_eq!(events[1].data, "Hi");
}

#[tokio::test]
async fn nonzero_exit_emits_error_then_done() {
    let events = collect(stream_launch(direct(), sh("exit 1"), CancellationToken::new(), GRACE)).await;

    assert_eq!(
        events,
        vec![
            ProtocolEvent::error("Agent process exited with code 1"),
            ProtocolEvent::done(),
        ]
    );
}

#[tokio::test]
async fn zero_exit_emits_only_done() {
    let events = collect(stream_launch(direct(), sh("true"), CancellationToken::new(), GRACE)).await;
    assert_eq!(events, vec![ProtocolEvent::done()]);
}

#[tokio::test]
async fn spawn_failure_emits_error_then_done() {
    let spec = LaunchSpec::new("/nonexistent/agent-binary", Vec::new(), std::env::temp_dir());
    let events = collect(stream_launch(direct(), spec, CancellationToken::new(), GRACE)).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Error);
    assert!(events[0].data.starts_with("Failed to start agent"));
    assert!(events[1].is_done());
}

#[tokio::test]
async fn stderr_becomes_tool_output() {
    let events = collect(stream_launch(
        direct(),
        sh("printf '\\033[33mwarming up\\033[0m\\n' >&2"),
        CancellationToken::new(),
        GRACE,
    ))
    .await;

    assert_terminates(&events);
    assert!(events.contains(&ProtocolEvent::tool_output("warming up")));
}

#[tokio::test]
async fn lines_arrive_in_order() {
    let script = r#"
        i=0
        while [ $i -lt 200 ]; do
            echo "{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"$i\"}"
            i=$((i + 1))
        done
    "#;
    let events = collect(stream_launch(direct(), sh(script), CancellationToken::new(), GRACE)).await;

    assert_terminates(&events);
    let texts: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::Thinking)
        .map(|e| e.data.clone())
        .collect();
    let expected: Vec<_> = (0..200).map(|i| i.to_string()).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn cancellation_ends_with_done_only() {
    let cancel = CancellationToken::new();
    let stream = stream_launch(direct(), sh("sleep 30"), cancel.clone(), GRACE);

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let events = collect(stream).await;
    assert_eq!(events, vec![ProtocolEvent::done()]);
}

#[tokio::test]
async fn cancelled_before_spawn_emits_done() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let events = collect(stream_launch(direct(), sh("echo never"), cancel, GRACE)).await;
    assert_eq!(events, vec![ProtocolEvent::done()]);
}

#[tokio::test]
async fn ignored_sigterm_escalates_to_sigkill() {
    let cancel = CancellationToken::new();
    let stream = stream_launch(
        direct(),
        sh("trap '' TERM; echo '{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"up\"}'; sleep 30"),
        cancel.clone(),
        Duration::from_millis(200),
    );

    let mut stream = stream;
    let first = timeout(LIMIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first, ProtocolEvent::thinking("up"));

    cancel.cancel();
    let rest = collect(stream).await;
    assert_eq!(rest, vec![ProtocolEvent::done()]);
}

#[tokio::test]
async fn dropping_consumer_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = format!(
        "echo $$ > '{}'; echo '{{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"up\"}}'; exec sleep 30",
        pid_file.display()
    );

    let mut stream = stream_launch(direct(), sh(&script), CancellationToken::new(), GRACE);
    let first = timeout(LIMIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Thinking);

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    drop(stream);

    let gone = timeout(LIMIT, async {
        loop {
            let alive = std::process::Command::new("kill")
                .args(["-0", &pid.to_string()])
                .status()
                .is_ok_and(|s| s.success());
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "agent process outlived its consumer");
}

#[tokio::test]
async fn cancellation_after_pipes_close_still_terminates() {
    let cancel = CancellationToken::new();
    let mut stream = stream_launch(
        direct(),
        sh("echo '{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"up\"}'; exec >/dev/null 2>&1; sleep 30"),
        cancel.clone(),
        Duration::from_millis(200),
    );

    let first = timeout(LIMIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first, ProtocolEvent::thinking("up"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    cancel.cancel();
    let rest = timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("cancel ignored once the agent closed its pipes");
    assert_eq!(rest, vec![ProtocolEvent::done()]);
}

#[tokio::test]
async fn dropping_consumer_after_pipes_close_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = format!(
        "echo $$ > '{}'; echo '{{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"up\"}}'; exec >/dev/null 2>&1; exec sleep 30",
        pid_file.display()
    );

    let mut stream = stream_launch(direct(), sh(&script), CancellationToken::new(), GRACE);
    let first = timeout(LIMIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Thinking);

    let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(stream);

    let gone = timeout(LIMIT, async {
        while std::process::Command::new("kill")
            .args(["-0", &pid])
            .status()
            .is_ok_and(|s| s.success())
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "agent process outlived its consumer");
}

#[tokio::test]
async fn stderr_after_termination_is_dropped() {
    let cancel = CancellationToken::new();
    let mut stream = stream_launch(
        direct(),
        sh("trap 'echo shutting down >&2; exit 0' TERM; echo '{\"type\":\"thinking\",\"subtype\":\"delta\",\"text\":\"up\"}'; sleep 30 & wait"),
        cancel.clone(),
        GRACE,
    );

    let first = timeout(LIMIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first, ProtocolEvent::thinking("up"));

    cancel.cancel();
    let rest = collect(stream).await;
    assert_eq!(rest, vec![ProtocolEvent::done()]);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn linux_script_wrapper_streams_events() {
    let script = r#"
        echo '{"type":"system","subtype":"init","session_id":"s1","model":"m"}'
        echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Hi"}]}}'
        exit 3
    "#;
    let events = collect(stream_launch(
        Arc::new(LinuxScript),
        sh(script),
        CancellationToken::new(),
        GRACE,
    ))
    .await;

    assert_terminates(&events);
    let kinds: Vec<_> = events
        .iter()
        .map(|e| e.kind)
        .filter(|kind| *kind != EventKind::ToolOutput)
        .collect();
    assert_eq!(
        kinds,
        vec![EventKind::Status, EventKind::Text, EventKind::Error, EventKind::Done]
    );
    assert!(events.contains(&ProtocolEvent::error("Agent process exited with code 3")));
}
