//! Control channel frames
//!
//! Besides its message stream, the agent process speaks a request/response
//! control protocol over the same pipes. The client sends `initialize`,
//! `interrupt` and runtime setting changes; the agent asks the client to run
//! hook callbacks and answer permission prompts before it executes tools.

use crate::error::{ProtocolError, Result};
use crate::hooks::HookEvent;
use crate::permissions::PermissionRequest;
use crate::types::PermissionMode;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use uuid::Uuid;

/// Callback id registered for the pre-tool-use phase
pub const PRE_TOOL_USE_CALLBACK_ID: &str = "agentwire_pre_tool_use";

/// Callback id registered for the post-tool-use phase
pub const POST_TOOL_USE_CALLBACK_ID: &str = "agentwire_post_tool_use";

/// Unique identifier for a control request sent by the client
///
/// Formatted as `req_<sequence>_<random hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new request id for the given sequence number
    pub fn new(sequence: u64) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("req_{}_{}", sequence, &random[..8]))
    }

    /// Create from raw string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control requests the client sends to the agent
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ClientControl {
    /// Handshake; registers hook callbacks
    Initialize {
        /// Hook registrations keyed by event name
        #[serde(skip_serializing_if = "Option::is_none")]
        hooks: Option<Value>,
    },

    /// Abandon the turn in flight
    Interrupt,

    /// Switch model for subsequent turns
    SetModel {
        /// New model; `None` restores the default
        model: Option<String>,
    },

    /// Switch permission mode for subsequent tool calls
    SetPermissionMode {
        /// New mode
        mode: PermissionMode,
    },
}

impl ClientControl {
    /// Wire name of the request
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Interrupt => "interrupt",
            Self::SetModel { .. } => "set_model",
            Self::SetPermissionMode { .. } => "set_permission_mode",
        }
    }

    /// Wrap the request in a `control_request` envelope
    pub fn to_frame(&self, request_id: &RequestId) -> Value {
        json!({
            "type": "control_request",
            "request_id": request_id.as_str(),
            "request": self,
        })
    }
}

/// Hook registrations for the initialize handshake
///
/// Every phase gets a single catch-all callback; tool matching and ordering
/// happen client-side.
pub fn initialize_hooks(events: &[HookEvent]) -> Option<Value> {
    if events.is_empty() {
        return None;
    }

    let mut hooks = serde_json::Map::new();
    for event in events {
        let callback_id = match event {
            HookEvent::PreToolUse => PRE_TOOL_USE_CALLBACK_ID,
            HookEvent::PostToolUse => POST_TOOL_USE_CALLBACK_ID,
        };
        hooks.insert(
            event.as_str().to_string(),
            json!([{ "matcher": null, "hookCallbackIds": [callback_id] }]),
        );
    }
    Some(Value::Object(hooks))
}

/// Map a registered callback id back to its phase
pub fn callback_event(callback_id: &str) -> Option<HookEvent> {
    match callback_id {
        PRE_TOOL_USE_CALLBACK_ID => Some(HookEvent::PreToolUse),
        POST_TOOL_USE_CALLBACK_ID => Some(HookEvent::PostToolUse),
        _ => None,
    }
}

/// Control requests the agent sends to the client
#[derive(Debug, Clone, PartialEq)]
pub enum AgentControl {
    /// Run a registered hook callback
    HookCallback {
        /// Id registered during initialize
        callback_id: String,
        /// Hook input payload
        input: Value,
        /// Invocation the hook is about
        tool_use_id: Option<String>,
    },

    /// Ask whether a tool may run
    CanUseTool(PermissionRequest),

    /// A request subtype the client does not handle
    Unsupported {
        /// Wire subtype
        subtype: String,
    },
}

/// An agent-initiated control request with its id
#[derive(Debug, Clone, PartialEq)]
pub struct AgentControlRequest {
    /// Id to echo in the response
    pub request_id: String,
    /// The request
    pub request: AgentControl,
}

impl AgentControlRequest {
    /// Parse a `control_request` frame
    pub fn parse(frame: &Value) -> Result<Self> {
        let request_id = frame
            .get("request_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("request_id".into()))?
            .to_string();
        let request = frame
            .get("request")
            .filter(|r| r.is_object())
            .ok_or_else(|| ProtocolError::MissingField("request".into()))?;
        let subtype = request
            .get("subtype")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("request.subtype".into()))?;

        let request = match subtype {
            "hook_callback" => AgentControl::HookCallback {
                callback_id: request
                    .get("callback_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::MissingField("callback_id".into()))?
                    .to_string(),
                input: request.get("input").cloned().unwrap_or(Value::Null),
                tool_use_id: request
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            "can_use_tool" => AgentControl::CanUseTool(
                serde_json::from_value(request.clone())
                    .map_err(|e| ProtocolError::InvalidControlRequest(e.to_string()))?,
            ),
            other => AgentControl::Unsupported {
                subtype: other.to_string(),
            },
        };

        Ok(Self {
            request_id,
            request,
        })
    }

    /// Success envelope answering this request
    pub fn success(&self, body: Value) -> Value {
        json!({
            "type": "control_response",
            "response": {
                "subtype": "success",
                "request_id": self.request_id,
                "response": body,
            }
        })
    }

    /// Error envelope answering this request
    pub fn error(&self, message: impl Into<String>) -> Value {
        json!({
            "type": "control_response",
            "response": {
                "subtype": "error",
                "request_id": self.request_id,
                "error": message.into(),
            }
        })
    }
}

/// The agent's answer to a client control request
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    /// Id of the request being answered
    pub request_id: String,
    /// Response body, or the agent's error message
    pub outcome: std::result::Result<Value, String>,
}

impl ControlResponse {
    /// Parse a `control_response` frame
    pub fn parse(frame: &Value) -> Result<Self> {
        let response = frame
            .get("response")
            .ok_or_else(|| ProtocolError::MissingField("response".into()))?;
        let request_id = response
            .get("request_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("response.request_id".into()))?
            .to_string();

        let outcome = match response.get("subtype").and_then(Value::as_str) {
            Some("success") => Ok(response.get("response").cloned().unwrap_or(Value::Null)),
            Some("error") => Err(response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified error")
                .to_string()),
            other => {
                return Err(ProtocolError::InvalidControlRequest(format!(
                    "unexpected control response subtype: {other:?}"
                )));
            }
        };

        Ok(Self {
            request_id,
            outcome,
        })
    }
}

/// Frame submitting a prompt as a new turn
pub fn user_turn_frame(prompt: &str, session_id: Option<&str>) -> Value {
    json!({
        "type": "user",
        "message": { "role": "user", "content": prompt },
        "parent_tool_use_id": null,
        "session_id": session_id.unwrap_or("default"),
    })
}
