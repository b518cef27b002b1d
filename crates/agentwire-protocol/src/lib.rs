//! Wire types for the agentwire session engine
//!
//! This crate provides the data structures exchanged with the agent process:
//! the message stream it emits, the control frames both sides send, hook and
//! permission payloads, and the configuration documents passed at launch.
//!
//! # Type Organization
//!
//! - **Content types**: [`content`] - Text, tool use/results, thinking
//! - **Message types**: [`message`] - User, assistant, system and result messages
//! - **Control frames**: [`control`] - Initialize, interrupt, hook callbacks
//! - **Hooks**: [`hooks`] - Hook input, decisions and matchers
//! - **Permissions**: [`permissions`] - Tool permission prompts
//! - **Launch documents**: [`agent`], [`schema`] - Sub-agents, tool servers, output schemas
//! - **Common types**: [`types`] - Usage, permission modes, model ids
//!
//! # Design Principles
//!
//! - **Zero I/O**: All types are pure data structures
//! - **Forward compatible**: unknown message and block types decode to catch-all variants

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod content;
pub mod control;
pub mod error;
pub mod hooks;
pub mod message;
pub mod permissions;
pub mod schema;
pub mod types;

// Re-export commonly used types at crate level
pub use agent::{AgentDefinition, McpServerConfig, mcp_tool_name};
pub use content::{ContentBlock, ToolUse};
pub use control::{AgentControl, AgentControlRequest, ClientControl, ControlResponse, RequestId};
pub use error::{ProtocolError, Result};
pub use hooks::{HookEvent, HookInput, HookMatcher, HookOutput, PostToolUseInput, PreToolUseInput};
pub use message::{AssistantMessage, Message, ResultMessage, SystemMessage, UserMessage};
pub use permissions::{PermissionRequest, PermissionResult};
pub use schema::JsonSchema;
pub use types::{PermissionMode, Usage, models};
