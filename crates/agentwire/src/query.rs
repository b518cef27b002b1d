//! One-shot queries
//!
//! Each function builds a client, runs a single turn and closes the session
//! again. The top-level functions block; [`nonblocking`] has async twins.
//!
//! ```no_run
//! use agentwire::{AgentOptions, query};
//!
//! # fn main() -> agentwire::Result<()> {
//! let answer = query::text("What is the capital of France?")?;
//!
//! let options = AgentOptions::builder().max_turns(1).build()?;
//! let result = query::execute_with("Summarise README.md", options)?;
//! println!("{} (${:.4})", result.text, result.metadata.cost_usd);
//! # Ok(())
//! # }
//! ```

use crate::client::{ClaudeClient, ClientBuilder, SyncMode, assistant_text};
use crate::config::AgentOptions;
use crate::error::{AgentError, Result};
use agentwire_protocol::{Message, ResultMessage, Usage};
use serde_json::Value;

/// Everything a one-shot turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Concatenated assistant text
    pub text: String,
    /// Every message of the turn, result last
    pub messages: Vec<Message>,
    /// Validated structured output, when a schema was configured
    pub structured_output: Option<Value>,
    /// Figures from the result message
    pub metadata: QueryMetadata,
}

/// Figures reported by a turn's result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryMetadata {
    /// Cost in USD, zero when unreported
    pub cost_usd: f64,
    /// Token usage
    pub usage: Usage,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Turns the agent counted on the session
    pub num_turns: u32,
    /// Session the turn ran on
    pub session_id: String,
    /// Whether the turn ended in error
    pub is_error: bool,
}

impl From<&ResultMessage> for QueryMetadata {
    fn from(result: &ResultMessage) -> Self {
        Self {
            cost_usd: result.cost_usd(),
            usage: result.usage.unwrap_or_default(),
            duration_ms: result.duration_ms,
            num_turns: result.num_turns,
            session_id: result.session_id.clone(),
            is_error: result.is_error,
        }
    }
}

impl QueryResult {
    pub(crate) fn from_messages(messages: Vec<Message>) -> Result<Self> {
        let result = messages
            .iter()
            .rev()
            .find_map(Message::as_result)
            .ok_or_else(|| AgentError::Transport("turn ended without a result".into()))?;

        Ok(Self {
            text: assistant_text(&messages),
            structured_output: result.structured_output.clone(),
            metadata: QueryMetadata::from(result),
            messages,
        })
    }

    /// Whether the turn completed without error
    pub fn is_success(&self) -> bool {
        !self.metadata.is_error
    }
}

fn run(builder: ClientBuilder<SyncMode>, prompt: &str) -> Result<Vec<Message>> {
    let client = builder.build()?;
    let messages = client
        .connect_and_receive(prompt)
        .and_then(|turn| turn.collect::<Result<Vec<_>>>());
    let closed = client.close();
    let messages = messages?;
    closed?;
    Ok(messages)
}

/// Run `prompt` with default options and return the answer text
pub fn text(prompt: &str) -> Result<String> {
    text_with(prompt, AgentOptions::default())
}

/// Run `prompt` with `options` and return the answer text
pub fn text_with(prompt: &str, options: AgentOptions) -> Result<String> {
    run(ClaudeClient::sync_with(options), prompt).map(|messages| assistant_text(&messages))
}

/// Run `prompt` with default options and return text, messages and metadata
pub fn execute(prompt: &str) -> Result<QueryResult> {
    execute_with(prompt, AgentOptions::default())
}

/// Run `prompt` with `options` and return text, messages and metadata
pub fn execute_with(prompt: &str, options: AgentOptions) -> Result<QueryResult> {
    run(ClaudeClient::sync_with(options), prompt).and_then(QueryResult::from_messages)
}

/// Run `prompt` with default options and return every message
pub fn query(prompt: &str) -> Result<Vec<Message>> {
    query_with(prompt, AgentOptions::default())
}

/// Run `prompt` with `options` and return every message
pub fn query_with(prompt: &str, options: AgentOptions) -> Result<Vec<Message>> {
    run(ClaudeClient::sync_with(options), prompt)
}

/// Run a one-shot turn through a fully configured builder
pub fn execute_on(builder: ClientBuilder<SyncMode>, prompt: &str) -> Result<QueryResult> {
    run(builder, prompt).and_then(QueryResult::from_messages)
}

/// Async one-shot queries
pub mod nonblocking {
    use super::QueryResult;
    use crate::client::{AsyncMode, ClaudeClient, ClientBuilder, assistant_text};
    use crate::config::AgentOptions;
    use crate::error::Result;
    use agentwire_protocol::Message;
    use futures::TryStreamExt;

    async fn run(builder: ClientBuilder<AsyncMode>, prompt: &str) -> Result<Vec<Message>> {
        let client = builder.build()?;
        let messages = client.connect(prompt).messages().try_collect().await;
        let closed = client.close().await;
        let messages = messages?;
        closed?;
        Ok(messages)
    }

    /// Run `prompt` with default options and return the answer text
    pub async fn text(prompt: &str) -> Result<String> {
        text_with(prompt, AgentOptions::default()).await
    }

    /// Run `prompt` with `options` and return the answer text
    pub async fn text_with(prompt: &str, options: AgentOptions) -> Result<String> {
        let messages = run(ClaudeClient::async_with(options), prompt).await?;
        Ok(assistant_text(&messages))
    }

    /// Run `prompt` with default options and return text, messages and metadata
    pub async fn execute(prompt: &str) -> Result<QueryResult> {
        execute_with(prompt, AgentOptions::default()).await
    }

    /// Run `prompt` with `options` and return text, messages and metadata
    pub async fn execute_with(prompt: &str, options: AgentOptions) -> Result<QueryResult> {
        QueryResult::from_messages(run(ClaudeClient::async_with(options), prompt).await?)
    }

    /// Run `prompt` with default options and return every message
    pub async fn query(prompt: &str) -> Result<Vec<Message>> {
        query_with(prompt, AgentOptions::default()).await
    }

    /// Run `prompt` with `options` and return every message
    pub async fn query_with(prompt: &str, options: AgentOptions) -> Result<Vec<Message>> {
        run(ClaudeClient::async_with(options), prompt).await
    }

    /// Run a one-shot turn through a fully configured builder
    pub async fn execute_on(builder: ClientBuilder<AsyncMode>, prompt: &str) -> Result<QueryResult> {
        QueryResult::from_messages(run(builder, prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAgent, ScriptedTurn};
    use serde_json::json;

    #[test]
    fn test_execute_on_collects_metadata() {
        let agent = ScriptedAgent::new();
        agent.push_turn(
            ScriptedTurn::new()
                .text("Paris")
                .cost(0.25)
                .usage(10, 5)
                .structured_output(json!({"city": "Paris"})),
        );

        let result = execute_on(ClaudeClient::sync().transport_factory(agent.clone()), "capital?").unwrap();
        assert_eq!(result.text, "Paris");
        assert!(result.is_success());
        assert_eq!(result.metadata.cost_usd, 0.25);
        assert_eq!(result.metadata.usage.total_tokens(), 15);
        assert_eq!(result.metadata.num_turns, 1);
        assert_eq!(result.structured_output, Some(json!({"city": "Paris"})));
        assert!(result.messages.last().is_some_and(Message::is_result));
    }

    #[tokio::test]
    async fn test_nonblocking_execute_on() {
        let agent = ScriptedAgent::new();
        agent.push_turn(ScriptedTurn::new().text("4"));

        let result = nonblocking::execute_on(
            ClaudeClient::r#async().transport_factory(agent.clone()),
            "2+2?",
        )
        .await
        .unwrap();
        assert_eq!(result.text, "4");
        assert!(!result.metadata.session_id.is_empty());
    }

    #[test]
    fn test_missing_result_is_transport_error() {
        assert!(matches!(
            QueryResult::from_messages(Vec::new()),
            Err(AgentError::Transport(_))
        ));
    }
}
