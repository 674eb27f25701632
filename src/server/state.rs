//! Shared handler state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bridge::AgentBridge;
use crate::permissions::PendingRequestTable;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Launches agent streams.
    pub bridge: Arc<AgentBridge>,
    /// Pending approval requests. One table per server.
    pub permissions: PendingRequestTable,
    /// Cancelled on shutdown; parent of every stream's token.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Create state with a permission table sized from the bridge config.
    #[must_use]
    pub fn new(bridge: AgentBridge, cancel: CancellationToken) -> Self {
        let permissions = PendingRequestTable::with_timeout(bridge.config().permissions.timeout());
        Self {
            bridge: Arc::new(bridge),
            permissions,
            cancel,
        }
    }
}
