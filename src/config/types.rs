//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::{SpawnStrategyKind, DEFAULT_UPLOAD_DIR};
use crate::permissions::DEFAULT_PERMISSION_TIMEOUT;

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How to find and launch the agent.
    pub agent: AgentConfig,
    /// Attachment materialization.
    pub uploads: UploadsConfig,
    /// Pending approval requests.
    pub permissions: PermissionsConfig,
    /// HTTP adapter.
    pub server: ServerConfig,
}

/// Agent discovery and launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Explicit path to the agent binary. Skips PATH lookup.
    pub binary: Option<PathBuf>,
    /// Names searched on the expanded PATH, in order.
    pub binary_names: Vec<String>,
    /// Extra directories appended to PATH.
    pub extra_path: Vec<PathBuf>,
    /// PTY wrapper selection.
    pub spawn_strategy: SpawnStrategyKind,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: None,
            binary_names: vec!["agent".to_string(), "cursor-agent".to_string()],
            extra_path: Vec::new(),
            spawn_strategy: SpawnStrategyKind::default(),
        }
    }
}

/// Where non-image attachments are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Directory name under the working directory.
    pub dir_name: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir_name: DEFAULT_UPLOAD_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Seconds before a pending request is denied.
    pub timeout_secs: u64,
}

impl PermissionsConfig {
    /// The timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_PERMISSION_TIMEOUT.as_secs(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl ServerConfig {
    /// The configured address as `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_permissive: true,
        }
    }
}
