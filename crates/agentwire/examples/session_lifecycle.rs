//! Resuming and forking sessions
//!
//! Run with: cargo run --example session_lifecycle

use agentwire::{ClaudeClient, models};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let first = ClaudeClient::r#async().model(models::HAIKU).build()?;
    let result = first
        .connect("Remember the code ALPHA-123. Reply with OK.")
        .result()
        .await?;
    let parent = result.session_id.clone();
    first.close().await?;
    println!("parent session: {parent}");

    // Pick the conversation up in a new client
    let resumed = ClaudeClient::r#async()
        .model(models::HAIKU)
        .resume(parent.clone())
        .build()?;
    let answer = resumed.connect("What was the code?").text().await?;
    println!("resumed: {answer}");
    resumed.close().await?;

    // Branch off without touching the parent
    let fork = ClaudeClient::r#async()
        .model(models::HAIKU)
        .resume(parent.clone())
        .fork_session(true)
        .build()?;
    let branched = fork
        .connect("Forget the code; the new code is BETA-456.")
        .result()
        .await?;
    println!("fork session: {} (parent {parent})", branched.session_id);
    fork.close().await?;

    Ok(())
}
