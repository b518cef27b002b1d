//! Answering permission prompts in-process
//!
//! Reads are pre-approved; every other tool is put to the callback, which
//! refuses anything touching files outside `src/`.
//!
//! Run with: cargo run --example with_permissions

use agentwire::{ClaudeClient, PermissionResult};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = ClaudeClient::sync()
        .allowed_tools(["Read"])
        .can_use_tool(|request| async move {
            let path = request.input["file_path"].as_str().unwrap_or_default();
            if path.starts_with("src/") {
                PermissionResult::allow()
            } else {
                PermissionResult::deny(format!("{} outside src/ is not allowed", request.tool_name))
            }
        })
        .build()?;

    for message in client.connect_and_receive("Add a module doc comment to src/lib.rs")? {
        if let Some(assistant) = message?.as_assistant() {
            println!("{assistant}");
        }
    }
    client.close()?;
    Ok(())
}
