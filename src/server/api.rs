//! Request and response bodies for the HTTP endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permissions::PermissionResult;

/// Body of `POST /api/permission`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDecisionRequest {
    /// Correlation id of the pending request.
    pub permission_request_id: String,
    /// The user's decision.
    pub decision: PermissionResult,
}

/// Body of `POST /api/permission/request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionAskRequest {
    /// Correlation id; generated when absent.
    #[serde(default)]
    pub permission_request_id: Option<String>,
    /// Tool name, for logs.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Input the tool would run with.
    #[serde(default)]
    pub tool_input: Value,
}

/// `{ "ok": bool }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}
