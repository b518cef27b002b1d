//! Message types emitted by the agent process
//!
//! A turn's stream is a sequence of [`Message`] values terminated by exactly one
//! [`Message::Result`]. Unknown top-level types are preserved verbatim in
//! [`Message::Unknown`].

use crate::content::{ContentBlock, ToolUse};
use crate::types::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A message decoded from the agent's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// User message (prompts echoed back, tool results)
    User(UserMessage),

    /// Assistant message
    Assistant(AssistantMessage),

    /// System message (init, compaction notices, ...)
    System(SystemMessage),

    /// Terminal message of a turn
    Result(ResultMessage),

    /// A message type this crate does not know about
    Unknown {
        /// Value of the frame's `type` field
        message_type: String,
        /// The complete frame
        raw: Value,
    },
}

impl Message {
    /// The wire name of this message's type
    pub fn type_name(&self) -> &str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::System(_) => "system",
            Self::Result(_) => "result",
            Self::Unknown { message_type, .. } => message_type,
        }
    }

    /// Check if this message terminates a turn
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Extract the assistant message, if this is one
    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    /// Extract the result message, if this is one
    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(msg) => Some(msg),
            _ => None,
        }
    }

    /// Content blocks carried by user and assistant messages
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::User(msg) => &msg.content,
            Self::Assistant(msg) => &msg.content,
            _ => &[],
        }
    }
}

/// A user message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    /// The content blocks in the message
    pub content: Vec<ContentBlock>,

    /// Tool use this message belongs to, for sub-agent traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Session the message was emitted in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// An assistant message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    /// The content blocks in the message
    pub content: Vec<ContentBlock>,

    /// The model used to generate this message
    #[serde(default)]
    pub model: String,

    /// Tool use this message belongs to, for sub-agent traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Session the message was emitted in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AssistantMessage {
    /// Concatenation of every text block, in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// The first text block, if any
    pub fn text_content(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    /// Every tool invocation requested by this message
    pub fn tool_uses(&self) -> Vec<ToolUse<'_>> {
        self.content
            .iter()
            .filter_map(ContentBlock::as_tool_use)
            .collect()
    }

    /// Check whether the message requests any tool
    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }
}

impl fmt::Display for AssistantMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// A system message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMessage {
    /// Subtype of the system message
    pub subtype: String,

    /// The complete frame
    pub data: Value,
}

impl SystemMessage {
    /// Session id announced by an `init` message
    pub fn session_id(&self) -> Option<&str> {
        self.data.get("session_id").and_then(Value::as_str)
    }

    /// Check if this is the `init` message sent at process start
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

/// The terminal record of a turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    /// `success`, `error_max_turns`, `error_during_execution`, ...
    pub subtype: String,

    /// Wall-clock duration of the turn in milliseconds
    #[serde(default)]
    pub duration_ms: u64,

    /// Time spent in API calls in milliseconds
    #[serde(default)]
    pub duration_api_ms: u64,

    /// Whether the turn ended in error
    #[serde(default)]
    pub is_error: bool,

    /// Number of agent turns the CLI counted for this exchange
    #[serde(default)]
    pub num_turns: u32,

    /// Session identifier
    #[serde(default)]
    pub session_id: String,

    /// Total cost in USD (if reported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Final answer text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Schema-shaped payload when an output schema was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,

    /// Error descriptions attached by the agent or by the client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ResultMessage {
    /// Build a client-side result for a turn that did not produce one
    pub fn synthesized(
        subtype: impl Into<String>,
        session_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            subtype: subtype.into(),
            is_error: true,
            session_id: session_id.into(),
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// Check whether the turn completed without error
    pub fn is_success(&self) -> bool {
        !self.is_error && self.subtype == "success"
    }

    /// Cost of the turn, zero when unreported
    pub fn cost_usd(&self) -> f64 {
        self.total_cost_usd.unwrap_or(0.0)
    }

    /// Record an error and flag the result
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.is_error = true;
        self.errors.push(error.into());
    }
}

impl fmt::Display for ResultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Result: cost=${:.4}, turns={}, session={}]",
            self.cost_usd(),
            self.num_turns,
            self.session_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant(content: Vec<ContentBlock>) -> AssistantMessage {
        AssistantMessage {
            content,
            model: "claude-haiku-4-5-20251001".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_assistant_text_helpers() {
        let msg = assistant(vec![
            ContentBlock::thinking("hmm"),
            ContentBlock::text("Hello, "),
            ContentBlock::tool_use("toolu_1", "Read", json!({"file_path": "a.txt"})),
            ContentBlock::text("world"),
        ]);

        assert_eq!(msg.text(), "Hello, world");
        assert_eq!(msg.text_content(), Some("Hello, "));
        assert!(msg.has_tool_use());
        assert_eq!(msg.tool_uses()[0].name, "Read");
        assert_eq!(msg.to_string(), "Hello, world");
    }

    #[test]
    fn test_assistant_without_text() {
        let msg = assistant(vec![ContentBlock::tool_use("t", "Bash", json!({}))]);
        assert_eq!(msg.text(), "");
        assert_eq!(msg.text_content(), None);
    }

    #[test]
    fn test_result_display() {
        let result = ResultMessage {
            subtype: "success".into(),
            num_turns: 2,
            session_id: "abc".into(),
            total_cost_usd: Some(0.0123),
            ..Default::default()
        };
        assert_eq!(result.to_string(), "[Result: cost=$0.0123, turns=2, session=abc]");
        assert!(result.is_success());
    }

    #[test]
    fn test_synthesized_result_is_error() {
        let result = ResultMessage::synthesized("error_stream_closed", "s1", "pipe closed");
        assert!(result.is_error);
        assert!(!result.is_success());
        assert_eq!(result.errors, vec!["pipe closed".to_string()]);
    }

    #[test]
    fn test_system_init_session() {
        let msg = SystemMessage {
            subtype: "init".into(),
            data: json!({"type": "system", "subtype": "init", "session_id": "s-42"}),
        };
        assert!(msg.is_init());
        assert_eq!(msg.session_id(), Some("s-42"));
    }
}
