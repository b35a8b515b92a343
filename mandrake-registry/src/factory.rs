//! The hook a caller plugs in to tell the registry how to build a
//! [`SessionCoordinator`] for a workspace's cached resources.
//!
//! The registry owns caching, limits, and disposal; it has no opinion on
//! which provider, price table, or prompt configuration a workspace uses
//! (that lives in workspace config, loaded by the caller). A
//! [`CoordinatorFactory`] is the seam between the two.

use async_trait::async_trait;

use mandrake_core::WorkspaceId;
use mandrake_coordinator::SessionCoordinator;

use crate::resources::WorkspaceResources;

/// Builds a [`SessionCoordinator`] bound to one workspace's cached
/// resources. Called at most once per session (the registry caches the
/// result), so expensive setup (e.g. resolving the active model config) is
/// fine here.
#[async_trait]
pub trait CoordinatorFactory: Send + Sync {
    /// Construct a coordinator for `workspace_id`, wired against its
    /// already-open `resources`.
    async fn build(
        &self,
        workspace_id: &WorkspaceId,
        resources: &WorkspaceResources,
    ) -> SessionCoordinator;
}
