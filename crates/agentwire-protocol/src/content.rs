//! Content block types
//!
//! The blocks carried inside user and assistant messages emitted by the agent
//! process. Tool invocations and their results are correlated by id, never by
//! position.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A content block in a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },

    /// A request from the model to use a tool.
    ToolUse {
        /// Invocation id, echoed back by the matching `ToolResult`.
        id: String,
        /// The name of the tool to be used.
        name: String,
        /// Opaque tool input.
        #[serde(default)]
        input: Value,
    },

    /// The result of a tool execution.
    ToolResult {
        /// The `id` of the `tool_use` block this result is for.
        tool_use_id: String,
        /// Tool output. Either a string or an array of nested blocks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        /// Whether the tool execution resulted in an error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Extended reasoning emitted before an answer.
    Thinking {
        /// The reasoning text.
        thinking: String,
        /// Signature attached by the API.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// A block type this crate does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Borrowed view of a `tool_use` block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolUse<'a> {
    /// Invocation id
    pub id: &'a str,
    /// Tool name
    pub name: &'a str,
    /// Tool input
    pub input: &'a Value,
}

impl ContentBlock {
    /// Create a text content block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool use content block
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool result content block
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(Value::String(content.into())),
            is_error: None,
        }
    }

    /// Create an error tool result
    pub fn tool_error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(Value::String(error.into())),
            is_error: Some(true),
        }
    }

    /// Create a thinking content block
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: None,
        }
    }

    /// Get the type name of this content block
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Thinking { .. } => "thinking",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this is a text block
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Check if this is a tool use block
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    /// Check if this is a tool result block
    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }

    /// Extract text if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Extract tool use if this is a tool use block
    pub fn as_tool_use(&self) -> Option<ToolUse<'_>> {
        match self {
            Self::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
            _ => None,
        }
    }

    /// Correlation id for tool blocks: the invocation id of a `ToolUse`, or the
    /// `tool_use_id` of a `ToolResult`.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            Self::ToolUse { id, .. } => Some(id),
            Self::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    /// Whether this is a tool result that reports success
    pub fn is_successful_tool_result(&self) -> bool {
        matches!(
            self,
            Self::ToolResult { is_error, .. } if *is_error != Some(true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_use_content() {
        let content = ContentBlock::tool_use("id_123", "Bash", json!({ "command": "ls" }));
        assert!(content.is_tool_use());
        assert_eq!(content.type_name(), "tool_use");
        assert_eq!(content.invocation_id(), Some("id_123"));

        let view = content.as_tool_use().unwrap();
        assert_eq!(view.name, "Bash");
        assert_eq!(view.input["command"], "ls");
    }

    #[test]
    fn test_unknown_block_type_decodes() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "server_tool_use", "id": "x"})).unwrap();
        assert_eq!(block, ContentBlock::Unknown);
    }

    #[test]
    fn test_tool_result_accepts_array_content() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_1",
            "content": [{"type": "text", "text": "ok"}]
        }))
        .unwrap();

        assert_eq!(block.invocation_id(), Some("toolu_1"));
        assert!(block.is_successful_tool_result());
    }

    #[test]
    fn test_error_result_is_not_successful() {
        let block = ContentBlock::tool_error("toolu_2", "denied");
        assert!(block.is_tool_result());
        assert!(!block.is_successful_tool_result());
    }
}
