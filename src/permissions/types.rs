//! Approval outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a tool call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Allow,
    Deny,
}

/// Decision for one pending approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResult {
    /// Allow or deny.
    pub behavior: Behavior,
    /// Tool input to use instead of the original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,
    /// Permission rule updates to persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_permissions: Option<Vec<Value>>,
    /// Explanation, mostly for denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PermissionResult {
    /// Allow with the original input.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            behavior: Behavior::Allow,
            updated_input: None,
            updated_permissions: None,
            message: None,
        }
    }

    /// Allow with replacement input.
    #[must_use]
    pub fn allow_with(input: Value) -> Self {
        Self {
            updated_input: Some(input),
            ..Self::allow()
        }
    }

    /// Deny with a message.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Deny,
            updated_input: None,
            updated_permissions: None,
            message: Some(message.into()),
        }
    }

    /// Returns true if the call may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.behavior == Behavior::Allow
    }
}
