//! Testing a Session Coordinator with a mock provider and no real MCP
//! servers — everything here runs against in-memory storage, so there's
//! no network and no subprocess involved.
//!
//! Run with: `cargo run --example testing_agents -p mandrake --features coordinator`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use mandrake::prelude::*;
use mandrake_provider::{Chunk, ChunkStream, ProviderRequest, Usage};
use tokio_util::sync::CancellationToken;

/// Replays a fixed queue of responses, one per `stream()` call — the same
/// pattern a `#[cfg(test)]` module would use to script a conversation.
struct ScriptedProvider {
    responses: Mutex<Vec<&'static str>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<&'static str>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        let text = if responses.is_empty() {
            "no more scripted responses"
        } else {
            responses.remove(0)
        };
        Ok(Box::pin(stream::iter(vec![
            Ok(Chunk::Text(text.to_string())),
            Ok(Chunk::Usage(Usage::default())),
            Ok(Chunk::End),
        ])))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

async fn run_one(provider: ScriptedProvider, prompt: &str) -> RoundOutcome {
    let storage = Storage::open_in_memory().await.unwrap();
    let manager = Arc::new(Manager::new());
    let coordinator = SessionCoordinator::new(
        storage.clone(),
        manager,
        Arc::new(provider),
        ModelPrice::flat(Default::default(), Default::default()),
        PromptConfig::default(),
        WorkspaceInfo::default(),
        CoordinatorConfig::default(),
    );

    let session = storage
        .create_session(None, None, None, HashMap::new())
        .await
        .unwrap();

    coordinator
        .handle_request(&session.id, prompt, Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::main]
async fn main() {
    println!("=== Test 1: simple single-turn response ===");
    {
        let provider = ScriptedProvider::new(vec!["The answer is 42."]);
        let outcome = run_one(provider, "What is the answer?").await;
        assert_eq!(outcome.turns.len(), 1);
        assert!(outcome.turns[0].raw_response.contains("42"));
        assert_eq!(outcome.exit, CoordinatorExit::Completed);
        println!("  turns: {}, exit: {:?}", outcome.turns.len(), outcome.exit);
    }

    println!("\n=== Test 2: max-turns enforcement ===");
    {
        // Each scripted response is a bare legacy tool tag with no
        // trailing text, so every turn makes a tool call and the round
        // keeps going (there's no "fs" server registered, so each call
        // itself fails, but that's still a tool call — the round only
        // stops on `max_turns_per_round`, not on tool failure).
        let storage = Storage::open_in_memory().await.unwrap();
        let manager = Arc::new(Manager::new());
        let coordinator = SessionCoordinator::new(
            storage.clone(),
            manager,
            Arc::new(ScriptedProvider::new(vec![
                "<read_file><path>/tmp/a.txt</path></read_file>",
                "<read_file><path>/tmp/b.txt</path></read_file>",
                "<read_file><path>/tmp/c.txt</path></read_file>",
            ])),
            ModelPrice::flat(Default::default(), Default::default()),
            PromptConfig::default(),
            WorkspaceInfo::default(),
            CoordinatorConfig {
                max_turns_per_round: 2,
                ..Default::default()
            },
        );
        let session = storage.create_session(None, None, None, HashMap::new()).await.unwrap();
        let outcome = coordinator
            .handle_request(&session.id, "go", Arc::new(AlwaysApprove), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.turns.len(), 2);
        assert_eq!(outcome.exit, CoordinatorExit::MaxTurns);
        println!("  turns: {}, exit: {:?}", outcome.turns.len(), outcome.exit);
    }

    println!("\nAll test patterns demonstrated.");
    println!("Use these patterns in your #[cfg(test)] modules with assert! macros.");
}
