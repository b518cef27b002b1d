//! Tool permission prompts
//!
//! When launched with `--permission-prompt-tool stdio` the agent asks the
//! client before running tools it is not already allowed to use. These types
//! model that question and its answer.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A `can_use_tool` question from the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRequest {
    /// Tool the agent wants to run
    pub tool_name: String,

    /// Arguments it wants to run it with
    #[serde(default)]
    pub input: Value,

    /// Permission updates the agent suggests alongside the question
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permission_suggestions: Vec<Value>,

    /// Path that triggered the prompt, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_path: Option<String>,
}

/// Answer to a [`PermissionRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionResult {
    /// Run the tool, optionally with rewritten arguments
    Allow {
        /// Replacement arguments
        updated_input: Option<Value>,
    },

    /// Refuse the tool call
    Deny {
        /// Explanation passed to the agent
        message: String,
        /// Also abandon the current turn
        interrupt: bool,
    },
}

impl PermissionResult {
    /// Allow with the original input
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    /// Deny with a message
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: false,
        }
    }

    /// Check whether the tool may run
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Body of the `can_use_tool` control response
    pub fn to_wire(&self, original_input: &Value) -> Value {
        match self {
            Self::Allow { updated_input } => json!({
                "behavior": "allow",
                "updatedInput": updated_input.as_ref().unwrap_or(original_input),
            }),
            Self::Deny { message, interrupt } => json!({
                "behavior": "deny",
                "message": message,
                "interrupt": interrupt,
            }),
        }
    }
}
