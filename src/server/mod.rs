//! HTTP adapter exposing the bridge as server-sent events.

mod api;
mod error;
mod handlers;
mod router;
mod state;

pub use api::{OkResponse, PermissionAskRequest, PermissionDecisionRequest};
pub use error::ServerError;
pub use handlers::{get_agent_status, post_chat, post_permission, post_permission_request};
pub use router::BridgeServer;
pub use state::AppState;
