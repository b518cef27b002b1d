//! Hook system types and matching
//!
//! Types shared between the hook dispatcher and the control channel: the tool
//! phases hooks attach to, the input a callback receives, the decision it
//! returns and the matcher that selects which tools it sees.

use crate::error::ProtocolError;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// The tool phase a hook is attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Before a tool runs; may block it
    PreToolUse,
    /// After a tool ran; observational
    PostToolUse,
}

impl HookEvent {
    /// Name used on the wire (`hook_event_name`, initialize hook map keys)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
        }
    }

    /// Parse a wire event name
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "PreToolUse" => Some(Self::PreToolUse),
            "PostToolUse" => Some(Self::PostToolUse),
            _ => None,
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects which tool invocations a hook sees
///
/// An empty matcher is a wildcard.
///
/// # Examples
///
/// ```
/// use agentwire_protocol::hooks::HookMatcher;
///
/// // Match specific tool by name
/// let bash = HookMatcher::tool("Bash");
/// assert!(bash.matches("Bash", &serde_json::json!({})));
///
/// // Match tools using regex
/// let writes = HookMatcher::new().try_with_tool_name_regex(r"^(Write|Edit)$").unwrap();
/// assert!(writes.matches("Edit", &serde_json::json!({})));
///
/// // Match any tool
/// assert!(HookMatcher::new().is_wildcard());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HookMatcher {
    /// Exact tool name to match (case-sensitive)
    pub tool_name: Option<String>,

    /// Regex pattern matched against the tool name
    pub tool_name_regex: Option<Regex>,

    /// Match only if tool input contains these top-level fields
    pub required_input_fields: Option<Vec<String>>,
}

impl HookMatcher {
    /// Create a new empty matcher (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher for one exact tool name
    pub fn tool(name: impl Into<String>) -> Self {
        Self::new().with_tool_name(name)
    }

    /// Set exact tool name to match
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Set a tool name regex pattern
    pub fn try_with_tool_name_regex(mut self, pattern: &str) -> Result<Self, ProtocolError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ProtocolError::InvalidMatcher(format!("{pattern}: {e}")))?;
        self.tool_name_regex = Some(regex);
        Ok(self)
    }

    /// Set required input fields
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_input_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Check if this matcher selects the given invocation
    pub fn matches(&self, tool_name: &str, tool_input: &Value) -> bool {
        if let Some(ref name) = self.tool_name
            && name != tool_name
        {
            return false;
        }

        if let Some(ref regex) = self.tool_name_regex
            && !regex.is_match(tool_name)
        {
            return false;
        }

        if let Some(ref required) = self.required_input_fields
            && required.iter().any(|field| tool_input.get(field).is_none())
        {
            return false;
        }

        true
    }

    /// A matcher with no tool criteria applies to every tool
    pub fn is_wildcard(&self) -> bool {
        self.tool_name.is_none()
            && self.tool_name_regex.is_none()
            && self.required_input_fields.is_none()
    }
}

/// Input handed to a pre-tool-use hook
#[derive(Debug, Clone, PartialEq)]
pub struct PreToolUseInput {
    /// Tool about to run
    pub tool_name: String,
    /// Tool arguments
    pub tool_input: Value,
    /// Invocation id of the matching `tool_use` block
    pub tool_use_id: Option<String>,
    /// Session the invocation belongs to
    pub session_id: Option<String>,
    /// Working directory of the agent
    pub cwd: Option<String>,
}

/// Input handed to a post-tool-use hook
#[derive(Debug, Clone, PartialEq)]
pub struct PostToolUseInput {
    /// Tool that ran
    pub tool_name: String,
    /// Tool arguments
    pub tool_input: Value,
    /// What the tool returned
    pub tool_response: Value,
    /// Invocation id of the matching `tool_use` block
    pub tool_use_id: Option<String>,
    /// Session the invocation belongs to
    pub session_id: Option<String>,
    /// Working directory of the agent
    pub cwd: Option<String>,
}

/// Hook callback input
#[derive(Debug, Clone, PartialEq)]
pub enum HookInput {
    /// Before a tool runs
    PreToolUse(PreToolUseInput),
    /// After a tool ran
    PostToolUse(PostToolUseInput),
}

impl HookInput {
    /// Parse a `hook_callback` input payload, rejecting missing fields
    ///
    /// `tool_use_id` is taken from the payload, falling back to the one on the
    /// enclosing control request.
    pub fn parse(input: &Value, tool_use_id: Option<&str>) -> Result<Self, ProtocolError> {
        let event_name = input
            .get("hook_event_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("hook_event_name".into()))?;
        let event = HookEvent::from_wire(event_name).ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("unsupported hook event: {event_name}"))
        })?;
        let tool_name = input
            .get("tool_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("tool_name".into()))?;
        let tool_input = input
            .get("tool_input")
            .filter(|v| v.is_object())
            .ok_or_else(|| ProtocolError::MissingField("tool_input".into()))?;
        let tool_response = match event {
            HookEvent::PostToolUse => Some(
                input
                    .get("tool_response")
                    .ok_or_else(|| ProtocolError::MissingField("tool_response".into()))?,
            ),
            HookEvent::PreToolUse => None,
        };

        Ok(Self::assemble(
            event,
            input,
            tool_name,
            tool_input.clone(),
            tool_response.cloned(),
            tool_use_id,
        ))
    }

    /// Parse a `hook_callback` payload, treating missing fields as absent
    ///
    /// Returns `None` only when the event itself cannot be identified.
    pub fn parse_lenient(input: &Value, tool_use_id: Option<&str>) -> Option<Self> {
        let event = input
            .get("hook_event_name")
            .and_then(Value::as_str)
            .and_then(HookEvent::from_wire)?;
        let tool_name = input
            .get("tool_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let tool_input = input
            .get("tool_input")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let tool_response = input.get("tool_response").cloned();

        Some(Self::assemble(
            event,
            input,
            tool_name,
            tool_input,
            tool_response,
            tool_use_id,
        ))
    }

    fn assemble(
        event: HookEvent,
        input: &Value,
        tool_name: &str,
        tool_input: Value,
        tool_response: Option<Value>,
        tool_use_id: Option<&str>,
    ) -> Self {
        let str_field = |name: &str| input.get(name).and_then(Value::as_str).map(String::from);
        let tool_use_id = str_field("tool_use_id").or_else(|| tool_use_id.map(String::from));
        let session_id = str_field("session_id");
        let cwd = str_field("cwd");

        match event {
            HookEvent::PreToolUse => Self::PreToolUse(PreToolUseInput {
                tool_name: tool_name.to_string(),
                tool_input,
                tool_use_id,
                session_id,
                cwd,
            }),
            HookEvent::PostToolUse => Self::PostToolUse(PostToolUseInput {
                tool_name: tool_name.to_string(),
                tool_input,
                tool_response: tool_response.unwrap_or(Value::Null),
                tool_use_id,
                session_id,
                cwd,
            }),
        }
    }

    /// Phase of this input
    pub fn event(&self) -> HookEvent {
        match self {
            Self::PreToolUse(_) => HookEvent::PreToolUse,
            Self::PostToolUse(_) => HookEvent::PostToolUse,
        }
    }

    /// Tool name
    pub fn tool_name(&self) -> &str {
        match self {
            Self::PreToolUse(input) => &input.tool_name,
            Self::PostToolUse(input) => &input.tool_name,
        }
    }

    /// Tool arguments
    pub fn tool_input(&self) -> &Value {
        match self {
            Self::PreToolUse(input) => &input.tool_input,
            Self::PostToolUse(input) => &input.tool_input,
        }
    }

    /// Invocation id
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            Self::PreToolUse(input) => input.tool_use_id.as_deref(),
            Self::PostToolUse(input) => input.tool_use_id.as_deref(),
        }
    }

    /// Tool response, for post-tool-use input
    pub fn tool_response(&self) -> Option<&Value> {
        match self {
            Self::PostToolUse(input) => Some(&input.tool_response),
            Self::PreToolUse(_) => None,
        }
    }

    /// Typed tool argument; `None` if absent or of the wrong shape
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.tool_input()
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// String tool argument
    pub fn str_argument(&self, name: &str) -> Option<&str> {
        self.tool_input().get(name).and_then(Value::as_str)
    }
}

/// Decision returned by a hook callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutput {
    /// Let the tool run
    Allow,
    /// Deny the tool call with a reason the agent gets to see
    Block {
        /// Explanation passed to the agent
        reason: String,
    },
}

impl HookOutput {
    /// Allow the tool call
    pub fn allow() -> Self {
        Self::Allow
    }

    /// Block the tool call
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    /// Check whether this decision blocks
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block { .. })
    }

    /// The block reason, if blocking
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Block { reason } => Some(reason),
            Self::Allow => None,
        }
    }

    /// Body of the `hook_callback` control response
    pub fn to_wire(&self, event: HookEvent) -> Value {
        match (self, event) {
            (Self::Allow, HookEvent::PreToolUse) => json!({
                "continue": true,
                "hookSpecificOutput": {
                    "hookEventName": event.as_str(),
                    "permissionDecision": "allow",
                }
            }),
            (Self::Allow, HookEvent::PostToolUse) => json!({ "continue": true }),
            (Self::Block { reason }, HookEvent::PreToolUse) => json!({
                "decision": "block",
                "reason": reason,
                "hookSpecificOutput": {
                    "hookEventName": event.as_str(),
                    "permissionDecision": "deny",
                    "permissionDecisionReason": reason,
                }
            }),
            (Self::Block { reason }, HookEvent::PostToolUse) => json!({
                "decision": "block",
                "reason": reason,
            }),
        }
    }
}

impl fmt::Display for HookOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Block { reason } => write!(f, "block: {reason}"),
        }
    }
}
