//! The process-wide Service Registry: caches per-workspace resources and
//! per-session coordinators, with LRU eviction and idle disposal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use mandrake_core::{SessionId, WorkspaceId};
use mandrake_coordinator::SessionCoordinator;
use mandrake_mcp::Manager;
use mandrake_storage::Storage;

use crate::error::RegistryError;
use crate::factory::CoordinatorFactory;
use crate::resources::WorkspaceResources;

/// Default cap on concurrently cached session coordinators (spec §4.9).
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 32;
/// Default idle threshold before a workspace's resources become eligible
/// for disposal.
pub const DEFAULT_WORKSPACE_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Interval between sweeps that dispose idle workspace resources.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct SessionEntry {
    coordinator: SessionCoordinator,
    workspace_id: WorkspaceId,
    last_used: Mutex<Instant>,
}

impl SessionEntry {
    fn touch(&self) {
        *self.last_used.lock().expect("last_used mutex poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().expect("last_used mutex poisoned").elapsed()
    }
}

struct Inner {
    workspaces: RwLock<HashMap<WorkspaceId, Arc<WorkspaceResources>>>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    factory: Arc<dyn CoordinatorFactory>,
    max_concurrent_sessions: usize,
    workspace_idle_timeout: Duration,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Process-wide cache of workspace resources and session coordinators.
///
/// One `Registry` is meant to be constructed once per process and shared
/// behind an `Arc`; [`Registry::start`] is idempotent so callers don't need
/// to coordinate who calls it.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// A registry with the default limits (spec §4.9).
    pub fn new(factory: Arc<dyn CoordinatorFactory>) -> Self {
        Self::with_limits(
            factory,
            DEFAULT_MAX_CONCURRENT_SESSIONS,
            DEFAULT_WORKSPACE_IDLE_TIMEOUT,
        )
    }

    /// A registry with caller-chosen limits, for tests that want to
    /// exercise eviction without waiting on real-world timeouts.
    pub fn with_limits(
        factory: Arc<dyn CoordinatorFactory>,
        max_concurrent_sessions: usize,
        workspace_idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                workspaces: RwLock::new(HashMap::new()),
                sessions: RwLock::new(HashMap::new()),
                factory,
                max_concurrent_sessions,
                workspace_idle_timeout,
                sweep_handle: Mutex::new(None),
            }),
        }
    }

    /// Start the periodic idle-disposal sweep. Idempotent: a second call
    /// is a no-op, matching the init contract.
    pub fn start(&self) {
        let mut handle = self.inner.sweep_handle.lock().expect("sweep_handle poisoned");
        if handle.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                sweep_idle_workspaces(&inner).await;
            }
        }));
    }

    /// Get or create the cached resources for `workspace_id`, opening
    /// storage at `path` on first call. Subsequent calls for the same id
    /// return the same cached instance regardless of `path`.
    pub async fn get_workspace_resources(
        &self,
        workspace_id: &WorkspaceId,
        path: impl AsRef<Path>,
    ) -> Result<Arc<WorkspaceResources>, RegistryError> {
        if let Some(existing) = self.inner.workspaces.read().await.get(workspace_id) {
            existing.touch();
            return Ok(Arc::clone(existing));
        }

        let mut workspaces = self.inner.workspaces.write().await;
        if let Some(existing) = workspaces.get(workspace_id) {
            existing.touch();
            return Ok(Arc::clone(existing));
        }

        let db_path = path.as_ref().join("mandrake.db");
        let storage = Storage::open(&db_path).await?;
        let manager = Arc::new(Manager::new());
        let resources = Arc::new(WorkspaceResources::new(manager, storage));
        workspaces.insert(workspace_id.clone(), Arc::clone(&resources));
        Ok(resources)
    }

    /// Get or create the session coordinator for `session_id` in
    /// `workspace_id`. The workspace's resources must already be cached
    /// (via [`Registry::get_workspace_resources`]); returns
    /// [`RegistryError::UnknownWorkspace`] otherwise.
    pub async fn get_session_coordinator(
        &self,
        workspace_id: &WorkspaceId,
        session_id: &SessionId,
    ) -> Result<SessionCoordinator, RegistryError> {
        if let Some(entry) = self.inner.sessions.read().await.get(session_id) {
            entry.touch();
            return Ok(entry.coordinator.clone());
        }

        let resources = {
            let workspaces = self.inner.workspaces.read().await;
            workspaces
                .get(workspace_id)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownWorkspace(workspace_id.to_string()))?
        };

        let coordinator = self.inner.factory.build(workspace_id, &resources).await;
        resources.acquire();

        let mut sessions = self.inner.sessions.write().await;
        if let Some(entry) = sessions.get(session_id) {
            // Lost a race with another caller building the same session;
            // keep theirs, release the redundant workspace borrow we took.
            resources.release();
            entry.touch();
            return Ok(entry.coordinator.clone());
        }

        if sessions.len() >= self.inner.max_concurrent_sessions {
            evict_least_recently_used(&mut sessions, &self.inner.workspaces).await;
        }

        sessions.insert(
            session_id.clone(),
            SessionEntry {
                coordinator: coordinator.clone(),
                workspace_id: workspace_id.clone(),
                last_used: Mutex::new(Instant::now()),
            },
        );

        Ok(coordinator)
    }

    /// Explicitly release a session's cached coordinator, releasing its
    /// borrow on the owning workspace's resources.
    pub async fn release_session_resources(&self, session_id: &SessionId) {
        let removed = self.inner.sessions.write().await.remove(session_id);
        if let Some(entry) = removed {
            if let Some(resources) = self.inner.workspaces.read().await.get(&entry.workspace_id) {
                resources.release();
            }
        }
    }

    /// Explicitly tear down a workspace's resources: shuts down its MCP
    /// server pool and drops the cached storage handle, regardless of
    /// whether sessions still hold a borrow (an explicit call is the
    /// caller asserting it has already released them).
    pub async fn release_workspace_resources(&self, workspace_id: &WorkspaceId) {
        let removed = self.inner.workspaces.write().await.remove(workspace_id);
        if let Some(resources) = removed {
            resources.manager.shutdown().await;
        }
    }

    /// Tear down everything: stop the sweep task, shut down every cached
    /// workspace's MCP server pool. Storage handles close when the last
    /// clone drops.
    pub async fn dispose(&self) {
        if let Some(handle) = self.inner.sweep_handle.lock().expect("sweep_handle poisoned").take() {
            handle.abort();
        }
        self.inner.sessions.write().await.clear();
        let workspaces: Vec<Arc<WorkspaceResources>> =
            self.inner.workspaces.write().await.drain().map(|(_, v)| v).collect();
        for resources in workspaces {
            resources.manager.shutdown().await;
        }
    }

    /// Number of cached session coordinators, for tests and diagnostics.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Whether a workspace currently has cached resources, for tests and
    /// diagnostics.
    pub async fn has_workspace_resources(&self, workspace_id: &WorkspaceId) -> bool {
        self.inner.workspaces.read().await.contains_key(workspace_id)
    }
}

async fn evict_least_recently_used(
    sessions: &mut HashMap<SessionId, SessionEntry>,
    workspaces: &RwLock<HashMap<WorkspaceId, Arc<WorkspaceResources>>>,
) {
    // The LRU victim is the entry with the *largest* elapsed idle time.
    let victim_id = sessions
        .iter()
        .max_by_key(|(_, entry)| entry.idle_for())
        .map(|(id, _)| id.clone());

    let Some(victim_id) = victim_id else { return };
    if let Some(entry) = sessions.remove(&victim_id) {
        // Releasing the borrow here only updates the ref count; whether
        // the now-idle workspace resources actually get torn down is left
        // to the periodic sweep (or an explicit release), since the
        // configured idle threshold almost never elapses within the same
        // instant as this eviction.
        if let Some(resources) = workspaces.read().await.get(&entry.workspace_id) {
            resources.release();
        }
    }
}

async fn sweep_idle_workspaces(inner: &Inner) {
    let idle: Vec<WorkspaceId> = {
        let workspaces = inner.workspaces.read().await;
        workspaces
            .iter()
            .filter(|(_, resources)| {
                resources.is_idle() && resources.idle_for() > inner.workspace_idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect()
    };

    for workspace_id in idle {
        let removed = inner.workspaces.write().await.remove(&workspace_id);
        if let Some(resources) = removed {
            resources.manager.shutdown().await;
        }
    }
}
