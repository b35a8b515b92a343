//! Per-workspace resources the registry caches: the MCP server pool and
//! the storage engine for one workspace's `.ws` directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use mandrake_mcp::Manager;
use mandrake_storage::Storage;

/// The resources one workspace needs to run sessions: its MCP server pool
/// and its embedded storage engine. Reference-counted by the registry, not
/// by `Arc::strong_count` on this struct itself — the registry hands out
/// clones of the inner `manager`/`storage` handles to coordinators, so
/// strong-count alone can't tell live sessions apart from a cached-but-idle
/// entry. `ref_count` is the registry's own explicit tally, incremented by
/// [`crate::Registry::get_session_coordinator`] and decremented by
/// [`crate::Registry::release_session_resources`].
pub struct WorkspaceResources {
    /// The MCP server pool for this workspace.
    pub manager: Arc<Manager>,
    /// The embedded storage engine for this workspace's session history.
    pub storage: Storage,
    pub(crate) ref_count: AtomicUsize,
    pub(crate) last_used: Mutex<Instant>,
}

impl WorkspaceResources {
    pub(crate) fn new(manager: Arc<Manager>, storage: Storage) -> Self {
        Self {
            manager,
            storage,
            ref_count: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_used.lock().expect("last_used mutex poisoned") = Instant::now();
    }

    pub(crate) fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    pub(crate) fn release(&self) {
        self.ref_count.fetch_sub(1, Ordering::SeqCst);
        self.touch();
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.ref_count.load(Ordering::SeqCst) == 0
    }

    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_used.lock().expect("last_used mutex poisoned").elapsed()
    }
}
