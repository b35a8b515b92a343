#![deny(missing_docs)]
//! # mandrake-registry — the Service Registry
//!
//! Process-wide singleton that caches per-workspace resources (an MCP
//! server [`mandrake_mcp::Manager`] and a [`mandrake_storage::Storage`]
//! handle) and the [`mandrake_coordinator::SessionCoordinator`] built on
//! top of them for each live session, with a concurrency cap, LRU
//! eviction, and a periodic idle sweep.

mod error;
mod factory;
mod registry;
mod resources;

pub use error::RegistryError;
pub use factory::CoordinatorFactory;
pub use registry::{
    Registry, DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_WORKSPACE_IDLE_TIMEOUT, SWEEP_INTERVAL,
};
pub use resources::WorkspaceResources;
