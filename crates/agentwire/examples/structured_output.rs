//! Schema-validated results
//!
//! Run with: cargo run --example structured_output

use agentwire::{ClaudeClient, JsonSchema};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let schema = JsonSchema::of_object(
        [
            ("answer", json!({"type": "number"})),
            ("explanation", json!({"type": "string"})),
        ],
        ["answer", "explanation"],
    );
    let client = ClaudeClient::r#async().output_schema(schema).build()?;

    let result = client.connect("What is 17 * 23?").result().await?;
    match result.structured_output {
        Some(output) if !result.is_error => println!("{output:#}"),
        _ => eprintln!("no valid output: {:?}", result.errors),
    }
    client.close().await?;
    Ok(())
}
