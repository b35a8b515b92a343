use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use rust_decimal::Decimal;

use mandrake_core::WorkspaceId;
use mandrake_coordinator::{AlwaysApprove, CoordinatorConfig, SessionCoordinator};
use mandrake_prompt::{PromptConfig, WorkspaceInfo};
use mandrake_provider::{
    Chunk, ChunkStream, ModelPrice, Provider, ProviderError, ProviderRequest, Usage,
};
use mandrake_registry::{CoordinatorFactory, Registry, WorkspaceResources};

struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        Ok(Box::pin(stream::iter(vec![
            Ok(Chunk::Text("ok".into())),
            Ok(Chunk::Usage(Usage::default())),
            Ok(Chunk::End),
        ])))
    }

    fn model_id(&self) -> &str {
        "echo-1"
    }
}

struct EchoFactory;

#[async_trait]
impl CoordinatorFactory for EchoFactory {
    async fn build(
        &self,
        _workspace_id: &WorkspaceId,
        resources: &WorkspaceResources,
    ) -> SessionCoordinator {
        SessionCoordinator::new(
            resources.storage.clone(),
            Arc::clone(&resources.manager),
            Arc::new(EchoProvider),
            ModelPrice::flat(Decimal::ZERO, Decimal::ZERO),
            PromptConfig::default(),
            WorkspaceInfo::default(),
            CoordinatorConfig::default(),
        )
    }
}

#[tokio::test]
async fn two_sessions_in_one_workspace_share_its_storage() {
    let registry = Registry::with_limits(Arc::new(EchoFactory), 32, Duration::from_secs(600));
    let dir = tempfile::tempdir().unwrap();
    let ws_id = WorkspaceId::from("ws1");
    let resources = registry
        .get_workspace_resources(&ws_id, dir.path())
        .await
        .unwrap();

    let session = resources
        .storage
        .create_session(Some(ws_id.clone()), None, None, HashMap::new())
        .await
        .unwrap();

    let coordinator = registry
        .get_session_coordinator(&ws_id, &session.id)
        .await
        .unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let outcome = coordinator
        .handle_request(&session.id, "hello", Arc::new(AlwaysApprove), cancel)
        .await
        .unwrap();
    assert!(!outcome.turns.is_empty());

    // A second coordinator for the same workspace reads the round the
    // first just wrote, since both share the same storage handle.
    let other = registry
        .get_session_coordinator(&ws_id, &session.id)
        .await
        .unwrap();
    let history = resources.storage.get_session_history(&session.id).await.unwrap();
    assert_eq!(history.rounds.len(), 1);
    drop(other);
}

#[tokio::test]
async fn releasing_a_session_allows_the_slot_to_be_reused() {
    let registry = Registry::with_limits(Arc::new(EchoFactory), 1, Duration::from_secs(600));
    let dir = tempfile::tempdir().unwrap();
    let ws_id = WorkspaceId::from("ws1");
    let resources = registry
        .get_workspace_resources(&ws_id, dir.path())
        .await
        .unwrap();

    let s1 = resources
        .storage
        .create_session(Some(ws_id.clone()), None, None, HashMap::new())
        .await
        .unwrap();
    let s2 = resources
        .storage
        .create_session(Some(ws_id.clone()), None, None, HashMap::new())
        .await
        .unwrap();

    registry.get_session_coordinator(&ws_id, &s1.id).await.unwrap();
    assert_eq!(registry.session_count().await, 1);

    registry.release_session_resources(&s1.id).await;
    assert_eq!(registry.session_count().await, 0);

    registry.get_session_coordinator(&ws_id, &s2.id).await.unwrap();
    assert_eq!(registry.session_count().await, 1);
}
