//! HTTP server with axum router and graceful shutdown.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{get_agent_status, post_chat, post_permission, post_permission_request};
use super::state::AppState;
use crate::bridge::AgentBridge;
use crate::config::ServerConfig;

/// HTTP front end for one [`AgentBridge`].
pub struct BridgeServer {
    config: ServerConfig,
    state: AppState,
}

impl BridgeServer {
    /// Create a server using the bridge's `[server]` settings.
    ///
    /// Cancelling `cancel` shuts the server down and cancels every open
    /// stream and pending approval.
    #[must_use]
    pub fn new(bridge: AgentBridge, cancel: CancellationToken) -> Self {
        let config = bridge.config().server.clone();
        Self {
            config,
            state: AppState::new(bridge, cancel),
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Shared handler state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/chat", post(post_chat))
            .route("/api/permission", post(post_permission))
            .route("/api/permission/request", post(post_permission_request))
            .route("/api/agent-status", get(get_agent_status))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::BindError` if the address is unavailable.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::BindError { address, source })
    }

    /// Run the server, binding to the configured address.
    ///
    /// The server will run until the cancellation token is triggered,
    /// at which point it will perform a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.state.cancel.clone();
        let app = self.build_router();
        let local: Option<SocketAddr> = listener.local_addr().ok();

        tracing::info!(address = ?local, "Starting bridge server");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Bridge server shutting down gracefully");
            })
            .await
            .map_err(ServerError::Serve)
    }
}
