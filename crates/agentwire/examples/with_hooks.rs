//! Gating tool calls with hooks
//!
//! A pre-tool-use hook refuses destructive shell commands; a post-tool-use
//! hook prints every tool result. The hook log records each decision.
//!
//! Run with: cargo run --example with_hooks

use agentwire::{ClaudeClient, HookMatcher, HookOutput, HookRegistry, Message};
use futures::StreamExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let hooks = Arc::new(HookRegistry::new());
    hooks.register_pre_tool_use_fn(HookMatcher::tool("Bash"), |input| {
        match input.str_argument("command") {
            Some(command) if command.contains("rm -rf") => {
                HookOutput::block("recursive deletes are not allowed")
            }
            _ => HookOutput::allow(),
        }
    });
    hooks.register_post_tool_use(|input| async move {
        println!("[post] {} -> {:?}", input.tool_name(), input.tool_response());
        Ok(())
    });

    let client = ClaudeClient::r#async()
        .allowed_tools(["Read", "Grep", "Bash"])
        .hooks(Arc::clone(&hooks))
        .build()?;

    let mut stream = Box::pin(client.connect("Delete the target directory").messages());
    while let Some(message) = stream.next().await {
        match message? {
            Message::Assistant(assistant) => println!("{assistant}"),
            Message::Result(result) => println!("{result}"),
            _ => {}
        }
    }

    for entry in client.hook_log() {
        println!("{} {}: {:?}", entry.phase, entry.tool_name, entry.decision);
    }
    client.close().await?;
    Ok(())
}
