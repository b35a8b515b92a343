//! End-to-end: an in-memory session driven by the Session Coordinator
//! against a real Anthropic model, with one MCP tool server registered.
//!
//! Requires the ANTHROPIC_API_KEY environment variable to be set, and a
//! `mcp-server-filesystem`-compatible binary on PATH (any stdio MCP server
//! works; swap the `command`/`args` below for what you have installed).
//!
//! Run with:
//!
//! ```sh
//! ANTHROPIC_API_KEY=sk-ant-... cargo run --example full_agent -p mandrake --features full
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use mandrake::prelude::*;
use mandrake_provider_anthropic::{prices, AnthropicProvider};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .expect("ANTHROPIC_API_KEY environment variable must be set");

    // 1. Open an in-memory store for this run's session history.
    let storage = Storage::open_in_memory().await?;

    // 2. Register an MCP server exposing filesystem tools, auto-approving
    //    reads so the model can look around without an interactive prompt.
    let manager = Arc::new(Manager::new());
    manager
        .start_server(
            "fs",
            ServerConfig {
                command: "mcp-server-filesystem".into(),
                args: vec!["/tmp".into()],
                env: HashMap::new(),
                auto_approve: vec!["read_file".into(), "list_files".into()],
                disabled: false,
                health_check: Default::default(),
                tool_timeout_ms: 30_000,
            },
        )
        .await?;

    // 3. Wire a coordinator: storage + manager + a real streaming provider.
    let provider = Arc::new(AnthropicProvider::new(api_key, "claude-haiku-4-5-20251001"));
    let coordinator = SessionCoordinator::new(
        storage.clone(),
        manager,
        provider,
        prices::HAIKU_4_5,
        PromptConfig {
            instructions: "You are a helpful assistant with read access to /tmp.".into(),
            ..Default::default()
        },
        WorkspaceInfo {
            name: "example-workspace".into(),
            path: "/tmp".into(),
            metadata: vec![],
        },
        CoordinatorConfig::default(),
    );

    // 4. Create a session and send one request.
    let session = storage
        .create_session(None, Some("full_agent example".into()), None, HashMap::new())
        .await?;

    let outcome = coordinator
        .handle_request(
            &session.id,
            "What files are in /tmp? Answer in one sentence.",
            Arc::new(AlwaysApprove),
            CancellationToken::new(),
        )
        .await?;

    println!("Round {} finished as {:?}", outcome.round.id, outcome.exit);
    for turn in &outcome.turns {
        if !turn.raw_response.is_empty() {
            println!("assistant: {}", turn.raw_response);
        }
        println!(
            "  tokens: {} in / {} out, cost ${}",
            turn.metrics.input, turn.metrics.output, turn.metrics.cost
        );
    }

    Ok(())
}
