//! Integration tests composing storage, MCP manager, and provider through
//! the Session Coordinator, with a mock provider standing in for a real
//! model backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use mandrake::prelude::*;
use mandrake_provider::{Chunk, ChunkStream, ProviderRequest, Usage};
use tokio_util::sync::CancellationToken;

struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        let text = if responses.is_empty() {
            String::new()
        } else {
            responses.remove(0)
        };
        Ok(Box::pin(stream::iter(vec![
            Ok(Chunk::Text(text)),
            Ok(Chunk::Usage(Usage {
                input_tokens: 10,
                output_tokens: 5,
                cache_read_tokens: None,
                cache_write_tokens: None,
            })),
            Ok(Chunk::End),
        ])))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

async fn coordinator_with(responses: Vec<&str>, config: CoordinatorConfig) -> (SessionCoordinator, Storage) {
    let storage = Storage::open_in_memory().await.unwrap();
    let manager = Arc::new(Manager::new());
    let coordinator = SessionCoordinator::new(
        storage.clone(),
        manager,
        Arc::new(ScriptedProvider::new(responses)),
        ModelPrice::flat(Default::default(), Default::default()),
        PromptConfig::default(),
        WorkspaceInfo::default(),
        config,
    );
    (coordinator, storage)
}

#[tokio::test]
async fn single_turn_text_response_completes_the_round() {
    let (coordinator, storage) =
        coordinator_with(vec!["Paris"], CoordinatorConfig::default()).await;
    let session = storage.create_session(None, None, None, HashMap::new()).await.unwrap();

    let outcome = coordinator
        .handle_request(
            &session.id,
            "What is the capital of France?",
            Arc::new(AlwaysApprove),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.turns.len(), 1);
    assert_eq!(outcome.turns[0].raw_response, "Paris");
    assert_eq!(outcome.exit, CoordinatorExit::Completed);
}

#[tokio::test]
async fn tool_call_then_followup_spans_two_turns() {
    let (coordinator, storage) = coordinator_with(
        vec![
            "<read_file><path>/tmp/a.txt</path></read_file>",
            "the file says hello",
        ],
        CoordinatorConfig::default(),
    )
    .await;
    let session = storage.create_session(None, None, None, HashMap::new()).await.unwrap();

    let outcome = coordinator
        .handle_request(&session.id, "read the file", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.turns.len(), 2);
    assert_eq!(outcome.exit, CoordinatorExit::Completed);
    assert_eq!(outcome.turns[0].tool_calls.len(), 1);
    assert_eq!(outcome.turns[0].tool_calls[0].call.name, "read_file");
    // no "fs" server is registered, so the call itself fails — the round
    // still progresses to the followup turn.
    assert!(outcome.turns[0].tool_calls[0].result.as_ref().unwrap().is_error);
    assert_eq!(outcome.turns[1].raw_response, "the file says hello");
}

#[tokio::test]
async fn max_turns_per_round_stops_an_unbounded_tool_loop() {
    let (coordinator, storage) = coordinator_with(
        vec![
            "<read_file><path>/a</path></read_file>",
            "<read_file><path>/b</path></read_file>",
            "<read_file><path>/c</path></read_file>",
        ],
        CoordinatorConfig {
            max_turns_per_round: 2,
            ..Default::default()
        },
    )
    .await;
    let session = storage.create_session(None, None, None, HashMap::new()).await.unwrap();

    let outcome = coordinator
        .handle_request(&session.id, "go", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.turns.len(), 2);
    assert_eq!(outcome.exit, CoordinatorExit::MaxTurns);
}

#[tokio::test]
async fn history_persists_across_requests_in_the_same_session() {
    let (coordinator, storage) = coordinator_with(
        vec!["first answer", "second answer"],
        CoordinatorConfig::default(),
    )
    .await;
    let session = storage.create_session(None, None, None, HashMap::new()).await.unwrap();

    coordinator
        .handle_request(&session.id, "first question", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();
    coordinator
        .handle_request(&session.id, "second question", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();

    let history = storage.get_session_history(&session.id).await.unwrap();
    assert_eq!(history.rounds.len(), 2);
    assert_eq!(history.rounds[0].request.content, "first question");
    assert_eq!(history.rounds[1].request.content, "second question");
}

#[tokio::test]
async fn registry_builds_and_caches_a_coordinator() {
    struct TestFactory {
        responses: Mutex<Option<Vec<&'static str>>>,
    }

    #[async_trait]
    impl mandrake_registry::CoordinatorFactory for TestFactory {
        async fn build(
            &self,
            _workspace_id: &WorkspaceId,
            resources: &WorkspaceResources,
        ) -> SessionCoordinator {
            let responses = self.responses.lock().unwrap().take().unwrap_or_default();
            SessionCoordinator::new(
                resources.storage.clone(),
                Arc::clone(&resources.manager),
                Arc::new(ScriptedProvider::new(responses)),
                ModelPrice::flat(Default::default(), Default::default()),
                PromptConfig::default(),
                WorkspaceInfo::default(),
                CoordinatorConfig::default(),
            )
        }
    }

    let registry = Registry::new(Arc::new(TestFactory {
        responses: Mutex::new(Some(vec!["hi there"])),
    }));
    let dir = tempfile::tempdir().unwrap();
    let ws_id = WorkspaceId::from("ws1");
    let resources = registry.get_workspace_resources(&ws_id, dir.path()).await.unwrap();

    let session = resources
        .storage
        .create_session(Some(ws_id.clone()), None, None, HashMap::new())
        .await
        .unwrap();

    let coordinator = registry.get_session_coordinator(&ws_id, &session.id).await.unwrap();
    let outcome = coordinator
        .handle_request(&session.id, "hello", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.turns[0].raw_response, "hi there");

    // A second lookup for the same session returns the cached coordinator
    // rather than invoking the factory again — its provider has already
    // consumed its one scripted response, so a further request gets the
    // provider's empty-queue fallback instead of a freshly built provider.
    let cached = registry.get_session_coordinator(&ws_id, &session.id).await.unwrap();
    let second = cached
        .handle_request(&session.id, "again", Arc::new(AlwaysApprove), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.turns[0].raw_response, "");
}
