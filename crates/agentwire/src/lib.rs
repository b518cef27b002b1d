//! Conversational session engine for agent CLIs
//!
//! `agentwire` drives an external agent process through multi-turn, streaming,
//! permission-gated conversations. One engine, [`AgentSession`], backs two
//! presentations:
//!
//! - [`ClaudeSyncClient`]: blocking calls that drain each turn before returning
//! - [`ClaudeAsyncClient`]: lazy turns consumed as futures or streams
//!
//! # Key Features
//!
//! - **Sessions**: connect, resume and fork by session id
//! - **Streaming**: every turn is a sequence of typed messages ending in one result
//! - **Hooks**: gate tool calls before they run, observe them after
//! - **Permissions**: answer the agent's permission prompts in-process
//! - **Runtime control**: interrupt, change model or permission mode mid-session
//! - **Structured output**: results validated against a caller-supplied schema
//!
//! # Architecture
//!
//! 1. **Protocol Layer** (`agentwire-protocol`): wire types
//! 2. **Transport Layer** (`agentwire-transport`): the agent subprocess
//! 3. **Session Layer** (this crate): decoder, hook dispatcher, state machine
//!    and the client facades
//!
//! # Usage Example
//!
//! ```no_run
//! use agentwire::{ClaudeClient, HookMatcher, HookOutput, HookRegistry};
//! use std::sync::Arc;
//!
//! # fn main() -> agentwire::Result<()> {
//! let hooks = Arc::new(HookRegistry::new());
//! hooks.register_pre_tool_use_fn(HookMatcher::tool("Bash"), |input| {
//!     match input.str_argument("command") {
//!         Some(command) if command.contains("rm -rf") => HookOutput::block("destructive command"),
//!         _ => HookOutput::allow(),
//!     }
//! });
//!
//! let client = ClaudeClient::sync()
//!     .allowed_tools(["Read", "Grep", "Bash"])
//!     .hooks(Arc::clone(&hooks))
//!     .build()?;
//!
//! for message in client.connect_and_receive("Clean up the build directory")? {
//!     println!("{:?}", message?);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod message_parser;
pub mod permissions;
pub mod query;
mod routing;
pub mod session;
pub mod testing;

pub use client::{
    AsyncMode, ClaudeAsyncClient, ClaudeClient, ClaudeSyncClient, ClientBuilder, InterruptHandle,
    MessageIter, SyncMode, TurnSpec,
};
pub use config::{AgentOptions, AgentOptionsBuilder, ClientSettings};
pub use error::{AgentError, Result};
pub use hooks::{HookDecision, HookHandle, HookInputPolicy, HookLogEntry, HookRegistry};
pub use message_parser::{DecodeError, ParsedMessage, decode_frame, parse_message};
pub use permissions::PermissionCallback;
pub use query::{QueryMetadata, QueryResult};
pub use session::{AgentSession, ClientSpend, Lifecycle, SessionInfo, TransportFactory, TurnReceiver};

pub use agentwire_protocol::{
    AgentDefinition, AssistantMessage, ContentBlock, HookEvent, HookInput, HookMatcher, HookOutput,
    JsonSchema, McpServerConfig, Message, PermissionMode, PermissionRequest, PermissionResult,
    ResultMessage, SystemMessage, Usage, UserMessage, mcp_tool_name, models,
};
