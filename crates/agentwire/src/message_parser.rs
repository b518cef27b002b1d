//! Frame decoding for the agent's output stream
//!
//! Every line the agent writes is one JSON frame. Message frames (`user`,
//! `assistant`, `system`, `result`) become [`Message`] values; control frames
//! travel on the same stream and are split off here so the router can answer
//! them without ever publishing them to a turn.
//!
//! Decoding is pure: no frame depends on any earlier one. Unknown message
//! types and unknown content block types decode to catch-all variants.
//!
//! # Example
//!
//! ```
//! use agentwire::message_parser::{ParsedMessage, decode_frame};
//!
//! let frame = r#"{"type":"assistant","message":{"model":"m","content":[{"type":"text","text":"Hi"}]}}"#;
//! let parsed = decode_frame(frame).unwrap();
//! assert!(parsed.is_regular_message());
//! assert_eq!(parsed.as_message().unwrap().as_assistant().unwrap().text(), "Hi");
//! ```

use agentwire_protocol::message::{AssistantMessage, ResultMessage, SystemMessage, UserMessage};
use agentwire_protocol::{AgentControlRequest, ContentBlock, ControlResponse, Message};
use serde_json::Value;

/// Errors that can occur while decoding a frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The line is not JSON
    #[error("frame is not valid JSON: {0}")]
    Json(String),

    /// The frame is JSON but not an object
    #[error("frame is not a JSON object: {0}")]
    NotAnObject(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A field has the wrong shape
    #[error("invalid {message_type} frame: {reason}")]
    InvalidMessage {
        /// Frame type being decoded
        message_type: String,
        /// What was wrong
        reason: String,
    },

    /// A control frame could not be interpreted
    #[error("invalid control frame: {0}")]
    Control(String),
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// Part of the conversation stream
    Regular(Message),

    /// The agent asks the client something
    ControlRequest(AgentControlRequest),

    /// The agent answers a client control request
    ControlResponse(ControlResponse),
}

impl ParsedMessage {
    /// Check whether the frame belongs to the conversation stream
    pub fn is_regular_message(&self) -> bool {
        matches!(self, Self::Regular(_))
    }

    /// Borrow the conversation message, if this is one
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Regular(msg) => Some(msg),
            _ => None,
        }
    }

    /// Take the conversation message, if this is one
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Regular(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Decode one line of agent output
pub fn decode_frame(line: &str) -> Result<ParsedMessage, DecodeError> {
    let value: Value = serde_json::from_str(line).map_err(|e| DecodeError::Json(e.to_string()))?;
    parse_message(value)
}

/// Decode an already-parsed JSON frame
///
/// # Errors
///
/// Returns `DecodeError` if:
/// - The frame is not an object or has no `type`
/// - A known message type is missing a required field
/// - A content block is structurally invalid
pub fn parse_message(data: Value) -> Result<ParsedMessage, DecodeError> {
    if !data.is_object() {
        return Err(DecodeError::NotAnObject(truncate(&data.to_string())));
    }

    let message_type = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::MissingField("type".into()))?
        .to_string();

    let message = match message_type.as_str() {
        "user" => Message::User(parse_user_message(&data)?),
        "assistant" => Message::Assistant(parse_assistant_message(&data)?),
        "system" => Message::System(parse_system_message(data)?),
        "result" => Message::Result(parse_result_message(data)?),
        "control_request" => {
            return AgentControlRequest::parse(&data)
                .map(ParsedMessage::ControlRequest)
                .map_err(|e| DecodeError::Control(e.to_string()));
        }
        "control_response" => {
            return ControlResponse::parse(&data)
                .map(ParsedMessage::ControlResponse)
                .map_err(|e| DecodeError::Control(e.to_string()));
        }
        _ => Message::Unknown {
            message_type,
            raw: data,
        },
    };

    Ok(ParsedMessage::Regular(message))
}

fn parse_user_message(data: &Value) -> Result<UserMessage, DecodeError> {
    let message = data
        .get("message")
        .ok_or_else(|| DecodeError::MissingField("message".into()))?;
    let content = message
        .get("content")
        .ok_or_else(|| DecodeError::MissingField("message.content".into()))?;

    Ok(UserMessage {
        content: parse_content_blocks("user", content)?,
        parent_tool_use_id: str_field(data, "parent_tool_use_id"),
        session_id: str_field(data, "session_id"),
    })
}

fn parse_assistant_message(data: &Value) -> Result<AssistantMessage, DecodeError> {
    let message = data
        .get("message")
        .ok_or_else(|| DecodeError::MissingField("message".into()))?;
    let content = message
        .get("content")
        .ok_or_else(|| DecodeError::MissingField("message.content".into()))?;

    Ok(AssistantMessage {
        content: parse_content_blocks("assistant", content)?,
        model: str_field(message, "model").unwrap_or_default(),
        parent_tool_use_id: str_field(data, "parent_tool_use_id"),
        session_id: str_field(data, "session_id"),
    })
}

fn parse_system_message(data: Value) -> Result<SystemMessage, DecodeError> {
    let subtype = str_field(&data, "subtype")
        .ok_or_else(|| DecodeError::MissingField("subtype".into()))?;

    Ok(SystemMessage {
        subtype,
        data,
    })
}

fn parse_result_message(data: Value) -> Result<ResultMessage, DecodeError> {
    if str_field(&data, "subtype").is_none() {
        return Err(DecodeError::MissingField("subtype".into()));
    }

    serde_json::from_value(data).map_err(|e| DecodeError::InvalidMessage {
        message_type: "result".into(),
        reason: e.to_string(),
    })
}

/// Content is either a bare string or an array of typed blocks
fn parse_content_blocks(
    message_type: &str,
    content: &Value,
) -> Result<Vec<ContentBlock>, DecodeError> {
    if let Some(text) = content.as_str() {
        return Ok(vec![ContentBlock::text(text)]);
    }

    let blocks = content
        .as_array()
        .ok_or_else(|| DecodeError::InvalidMessage {
            message_type: message_type.into(),
            reason: "content must be string or array".into(),
        })?;

    blocks
        .iter()
        .map(|block| {
            if block.get("type").and_then(Value::as_str).is_none() {
                return Err(DecodeError::MissingField("content block type".into()));
            }
            serde_json::from_value(block.clone()).map_err(|e| DecodeError::InvalidMessage {
                message_type: message_type.into(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(String::from)
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 120;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_protocol::AgentControl;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_user_message() {
        let json = json!({
            "type": "user",
            "message": {
                "content": [{"type": "text", "text": "Hello"}]
            }
        });

        let msg = parse_message(json).unwrap().into_message().unwrap();
        let Message::User(user_msg) = msg else {
            panic!("expected user message");
        };
        assert_eq!(user_msg.content.len(), 1);
        assert_eq!(user_msg.content[0].as_text(), Some("Hello"));
    }

    #[test]
    fn test_parse_user_string_content() {
        let json = json!({"type": "user", "message": {"role": "user", "content": "plain"}});
        let msg = parse_message(json).unwrap().into_message().unwrap();
        assert_eq!(msg.content()[0].as_text(), Some("plain"));
    }

    #[test]
    fn test_parse_tool_result_block() {
        let json = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": [{"type": "text", "text": "ok"}]}
            ]},
            "parent_tool_use_id": null,
            "session_id": "s-1"
        });

        let msg = parse_message(json).unwrap().into_message().unwrap();
        let block = &msg.content()[0];
        assert_eq!(block.invocation_id(), Some("toolu_1"));
        assert!(block.is_successful_tool_result());
        let Message::User(user) = msg else {
            panic!("expected user message");
        };
        assert_eq!(user.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_parse_assistant_message() {
        let json = json!({
            "type": "assistant",
            "message": {
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"file_path": "a.rs"}}
                ]
            }
        });

        let msg = parse_message(json).unwrap().into_message().unwrap();
        let assistant = msg.as_assistant().unwrap();
        assert_eq!(assistant.model, "claude-sonnet-4-5");
        assert_eq!(assistant.text(), "Let me look.");
        assert!(assistant.has_tool_use());
        assert_eq!(assistant.tool_uses()[0].name, "Read");
    }

    #[test]
    fn test_unknown_content_block_is_preserved_as_unknown() {
        let json = json!({
            "type": "assistant",
            "message": {"model": "m", "content": [{"type": "server_tool_use", "id": "x"}]}
        });
        let msg = parse_message(json).unwrap().into_message().unwrap();
        assert_eq!(msg.content(), &[ContentBlock::Unknown]);
    }

    #[test]
    fn test_parse_system_message() {
        let json = json!({"type": "system", "subtype": "init", "session_id": "abc", "tools": []});
        let msg = parse_message(json).unwrap().into_message().unwrap();
        let Message::System(system) = msg else {
            panic!("expected system message");
        };
        assert!(system.is_init());
        assert_eq!(system.session_id(), Some("abc"));
    }

    #[test]
    fn test_parse_result_message() {
        let json = json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 1200,
            "duration_api_ms": 900,
            "is_error": false,
            "num_turns": 2,
            "session_id": "sess-1",
            "total_cost_usd": 0.0125,
            "usage": {"input_tokens": 100, "output_tokens": 40},
            "result": "Done",
            "structured_output": {"answer": 4}
        });

        let msg = parse_message(json).unwrap().into_message().unwrap();
        let result = msg.as_result().unwrap();
        assert!(result.is_success());
        assert_eq!(result.num_turns, 2);
        assert_eq!(result.usage.as_ref().unwrap().output_tokens, 40);
        assert_eq!(result.structured_output, Some(json!({"answer": 4})));
        assert_eq!(result.to_string(), "[Result: cost=$0.0125, turns=2, session=sess-1]");
    }

    #[test]
    fn test_unknown_message_type() {
        let json = json!({"type": "stream_event", "event": {"delta": "x"}});
        let msg = parse_message(json.clone()).unwrap().into_message().unwrap();
        assert_eq!(msg.type_name(), "stream_event");
        assert!(matches!(msg, Message::Unknown { raw, .. } if raw == json));
    }

    #[test]
    fn test_control_request_is_split_off() {
        let frame = r#"{"type":"control_request","request_id":"r1","request":{"subtype":"hook_callback","callback_id":"cb","input":{},"tool_use_id":"toolu_9"}}"#;
        let parsed = decode_frame(frame).unwrap();
        assert!(!parsed.is_regular_message());
        let ParsedMessage::ControlRequest(request) = parsed else {
            panic!("expected control request");
        };
        assert!(matches!(
            request.request,
            AgentControl::HookCallback { tool_use_id: Some(ref id), .. } if id == "toolu_9"
        ));
    }

    #[test]
    fn test_control_response_is_split_off() {
        let frame = r#"{"type":"control_response","response":{"subtype":"error","request_id":"req_1_ab","error":"nope"}}"#;
        let ParsedMessage::ControlResponse(response) = decode_frame(frame).unwrap() else {
            panic!("expected control response");
        };
        assert_eq!(response.request_id, "req_1_ab");
        assert_eq!(response.outcome, Err("nope".to_string()));
    }

    #[test]
    fn test_missing_type_field() {
        let err = parse_message(json!({"message": {}})).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("type".into()));
    }

    #[test]
    fn test_missing_content() {
        let err = parse_message(json!({"type": "assistant", "message": {}})).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("message.content".into()));
    }

    #[test]
    fn test_malformed_text_block() {
        let err = parse_message(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text"}]}
        }))
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidMessage { .. }));
    }

    #[test]
    fn test_not_json_and_not_object() {
        assert!(matches!(decode_frame("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_frame("[1,2]"), Err(DecodeError::NotAnObject(_))));
    }

    #[test]
    fn test_result_without_subtype() {
        let err = parse_message(json!({"type": "result", "session_id": "s"})).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("subtype".into()));
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(line in ".{0,200}") {
            let _ = decode_frame(&line);
        }

        #[test]
        fn prop_unknown_types_round_trip_raw(kind in "[a-z_]{1,20}") {
            prop_assume!(!["user", "assistant", "system", "result", "control_request", "control_response"].contains(&kind.as_str()));
            let frame = json!({"type": kind, "payload": 1});
            let msg = parse_message(frame.clone()).unwrap().into_message().unwrap();
            prop_assert_eq!(msg.type_name(), kind.as_str());
        }
    }
}
