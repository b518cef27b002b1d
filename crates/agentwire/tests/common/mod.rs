//! Shared helpers for the integration tests

#![allow(dead_code)]

use agentwire::testing::ScriptedAgent;
use agentwire::{
    AgentSession, AsyncMode, ClaudeAsyncClient, ClaudeClient, ClientBuilder, ContentBlock,
    Lifecycle, Message,
};
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route engine logs to the test output when `RUST_LOG` is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Async builder wired to `agent`
pub fn scripted(agent: &ScriptedAgent) -> ClientBuilder<AsyncMode> {
    init_tracing();
    ClaudeClient::r#async().transport_factory(agent.clone())
}

/// Async client wired to `agent` with default options
pub fn client(agent: &ScriptedAgent) -> ClaudeAsyncClient {
    scripted(agent).build().expect("client should build")
}

/// Every content block of every message
pub fn blocks(messages: &[Message]) -> Vec<ContentBlock> {
    messages
        .iter()
        .flat_map(|message| message.content().to_vec())
        .collect()
}

/// Names of every tool the agent tried to use
pub fn tool_names(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(Message::as_assistant)
        .flat_map(|assistant| {
            assistant
                .tool_uses()
                .into_iter()
                .map(|tool| tool.name.to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Wait until no turn is in flight
pub async fn wait_idle(session: &AgentSession) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.lifecycle() == (Lifecycle::Connected { turn_in_flight: true }) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("turn should finish");
}
