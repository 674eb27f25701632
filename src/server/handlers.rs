//! HTTP handlers.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::StreamExt;
use uuid::Uuid;

use super::api::{OkResponse, PermissionAskRequest, PermissionDecisionRequest};
use super::state::AppState;
use crate::bridge::{probe_agent, AgentStatus, StreamRequest};
use crate::permissions::PermissionResult;

/// POST /api/chat - Stream one prompt as SSE `data:` frames.
///
/// Closing the connection drops the event stream, which cancels the agent.
pub async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let stream_id = Uuid::new_v4();
    tracing::info!(
        stream_id = %stream_id,
        model = request.model.as_deref().unwrap_or("default"),
        resume = request.resume_session_id.is_some(),
        attachments = request.attachments.len(),
        "Starting chat stream"
    );

    let request = request.with_cancellation(state.cancel.child_token());
    let events = state
        .bridge
        .stream(request)
        .map(|event| Ok(Event::default().data(event.to_json())));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// POST /api/permission - Resolve a pending approval request.
pub async fn post_permission(
    State(state): State<AppState>,
    Json(body): Json<PermissionDecisionRequest>,
) -> Json<OkResponse> {
    let ok = state
        .permissions
        .resolve(&body.permission_request_id, body.decision);
    Json(OkResponse { ok })
}

/// POST /api/permission/request - Register an approval request and wait
/// for its decision.
///
/// The request is aborted if the caller disconnects first.
pub async fn post_permission_request(
    State(state): State<AppState>,
    Json(body): Json<PermissionAskRequest>,
) -> Json<PermissionResult> {
    let id = body
        .permission_request_id
        .unwrap_or_else(|| format!("perm-{}", Uuid::new_v4()));
    tracing::info!(
        id = %id,
        tool = body.tool_name.as_deref().unwrap_or("unknown"),
        "Awaiting permission decision"
    );

    let abort = state.cancel.child_token();
    let _abort_on_drop = abort.clone().drop_guard();
    let result = state
        .permissions
        .register(id, body.tool_input, Some(abort))
        .await;

    Json(result)
}

/// GET /api/agent-status - Whether the agent is installed.
pub async fn get_agent_status(State(state): State<AppState>) -> Json<AgentStatus> {
    Json(probe_agent(&state.bridge.config().agent).await)
}
