//! Client facades
//!
//! Two presentations of the same [`AgentSession`](crate::session::AgentSession):
//!
//! - [`ClaudeSyncClient`] blocks the calling thread until each turn's result
//!   has been observed. It owns a small worker runtime; decoding and hook
//!   dispatch never run on the caller's thread.
//! - [`ClaudeAsyncClient`] hands out lazy [`TurnSpec`] values that resolve to
//!   text, message streams or results on the caller's runtime.
//!
//! Both are built through [`ClaudeClient`]:
//!
//! ```no_run
//! use agentwire::ClaudeClient;
//!
//! # fn main() -> agentwire::Result<()> {
//! let client = ClaudeClient::sync()
//!     .model("claude-sonnet-4-5")
//!     .allowed_tools(["Read", "Grep"])
//!     .build()?;
//!
//! println!("{}", client.connect_text("List the files in this directory")?);
//! println!("{}", client.query_text("Which one is largest?")?);
//! # Ok(())
//! # }
//! ```

mod r#async;
mod builder;
mod sync;

pub use self::r#async::{ClaudeAsyncClient, TurnSpec};
pub use self::builder::{AsyncMode, ClientBuilder, SyncMode};
pub use self::sync::{ClaudeSyncClient, InterruptHandle, MessageIter};

use crate::config::AgentOptions;

/// Entry point for building clients
#[derive(Debug, Clone, Copy)]
pub struct ClaudeClient;

impl ClaudeClient {
    /// Builder for a blocking client with fluent options
    pub fn sync() -> ClientBuilder<SyncMode> {
        ClientBuilder::new()
    }

    /// Builder for a blocking client around pre-built options
    pub fn sync_with(options: AgentOptions) -> ClientBuilder<SyncMode> {
        ClientBuilder::new().options(options)
    }

    /// Builder for a non-blocking client with fluent options
    pub fn r#async() -> ClientBuilder<AsyncMode> {
        ClientBuilder::new()
    }

    /// Builder for a non-blocking client around pre-built options
    pub fn async_with(options: AgentOptions) -> ClientBuilder<AsyncMode> {
        ClientBuilder::new().options(options)
    }
}

/// Concatenated text of every assistant message
pub(crate) fn assistant_text(messages: &[agentwire_protocol::Message]) -> String {
    messages
        .iter()
        .filter_map(agentwire_protocol::Message::as_assistant)
        .map(agentwire_protocol::AssistantMessage::text)
        .collect()
}
