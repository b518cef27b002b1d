//! One-shot and blocking queries
//!
//! Run with: cargo run --example simple_query

use agentwire::{AgentOptions, ClaudeClient, models, query};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // One turn, then the process is shut down again
    let options = AgentOptions::builder()
        .model(models::HAIKU)
        .max_turns(1)
        .build()?;
    let result = query::execute_with("What is the capital of France?", options)?;
    println!("{}", result.text);
    println!(
        "session {} cost ${:.4}, {} tokens",
        result.metadata.session_id,
        result.metadata.cost_usd,
        result.metadata.usage.total_tokens()
    );

    // A conversation: both turns run on the same session
    let client = ClaudeClient::sync().model(models::HAIKU).build()?;
    println!("{}", client.connect_text("Name three prime numbers.")?);
    println!("{}", client.query_text("Now add them up.")?);
    println!("{:?}", client.session().info());
    client.close()?;

    Ok(())
}
