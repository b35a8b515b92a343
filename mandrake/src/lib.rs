#![deny(missing_docs)]
//! # mandrake — umbrella crate
//!
//! A single import surface for the Mandrake platform: the domain model
//! (sessions, rounds, turns), the embedded storage engine, the MCP
//! subprocess manager, the streaming provider abstraction, the Session
//! Coordinator that ties them into a round/turn loop, and the Service
//! Registry that caches that wiring per workspace. Re-exports each
//! component behind a feature flag, plus a [`prelude`] for the common
//! path of running a coordinator-backed workspace.

#[cfg(feature = "coordinator")]
pub use mandrake_coordinator;
pub use mandrake_core;
#[cfg(feature = "mcp")]
pub use mandrake_mcp;
#[cfg(feature = "parser")]
pub use mandrake_parser;
#[cfg(feature = "prompt")]
pub use mandrake_prompt;
#[cfg(feature = "provider")]
pub use mandrake_provider;
#[cfg(feature = "provider-anthropic")]
pub use mandrake_provider_anthropic;
#[cfg(feature = "provider-ollama")]
pub use mandrake_provider_ollama;
#[cfg(feature = "registry")]
pub use mandrake_registry;
#[cfg(feature = "storage")]
pub use mandrake_storage;

/// Happy-path imports for wiring a workspace's storage, MCP manager, and
/// provider into a coordinator, and for caching that wiring via the
/// registry.
pub mod prelude {
    pub use mandrake_core::{
        Content, ContentBlock, ErrorKind, MandrakeError, RequestId, ResponseId, RoundId,
        ServerId, Session, SessionId, Turn, TurnId, WorkspaceId,
    };

    #[cfg(feature = "storage")]
    pub use mandrake_storage::{Storage, StorageError};

    #[cfg(feature = "mcp")]
    pub use mandrake_mcp::{Manager, McpError, ServerConfig};

    #[cfg(feature = "parser")]
    pub use mandrake_parser::{Block, StreamParser};

    #[cfg(feature = "prompt")]
    pub use mandrake_prompt::{BuildInput, PromptConfig, SystemInfo, WorkspaceInfo};

    #[cfg(feature = "provider")]
    pub use mandrake_provider::{ChunkStream, ModelPrice, Provider, ProviderError};

    #[cfg(feature = "provider-anthropic")]
    pub use mandrake_provider_anthropic::AnthropicProvider;

    #[cfg(feature = "provider-ollama")]
    pub use mandrake_provider_ollama::OllamaProvider;

    #[cfg(feature = "coordinator")]
    pub use mandrake_coordinator::{
        AlwaysApprove, ApprovalHook, CoordinatorConfig, CoordinatorExit, HandleRequestError,
        RoundOutcome, SessionCoordinator,
    };

    #[cfg(feature = "registry")]
    pub use mandrake_registry::{CoordinatorFactory, Registry, WorkspaceResources};
}
