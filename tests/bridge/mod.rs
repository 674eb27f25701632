//! Bridge module tests.

mod command_test;
mod stream_test;
mod translator_test;

/// Verify the public bridge types are exported from the library.
#[test]
fn test_bridge_types_exported() {
    use agent_bridge::bridge::{
        sanitize, select_strategy, AgentCommandBuilder, CancellationController, EventTranslator,
        LineAssembler, ProtocolEvent, SpawnStrategyKind, StreamRequest,
    };
    use tokio_util::sync::CancellationToken;

    let _ = sanitize(b"");
    let _ = LineAssembler::new();
    let _ = EventTranslator::new();
    let _ = AgentCommandBuilder::new("hi", "/tmp").build_args();
    let _ = StreamRequest::new("hi");
    let _ = ProtocolEvent::done();
    let _ = CancellationController::new(CancellationToken::new(), std::time::Duration::ZERO);
    assert_eq!(select_strategy(SpawnStrategyKind::Direct).name(), "direct");
}
