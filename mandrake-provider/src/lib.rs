//! # mandrake-provider — streaming chat-provider abstraction
//!
//! A polymorphic capability set implemented by each concrete model backend
//! (`mandrake-provider-anthropic`, `mandrake-provider-ollama`, ...): one
//! async method, [`Provider::stream`], that turns a [`ProviderRequest`]
//! into a lazy, finite, single-pass stream of [`Chunk`]s, rather than a
//! single-shot `complete()` call.
//!
//! Cost is never reported by a provider; [`price::ModelPrice::cost`]
//! computes it from the authoritative final [`Usage`].

#![deny(missing_docs)]

mod error;
mod price;
mod types;

pub use error::ProviderError;
pub use price::ModelPrice;
pub use types::{Chunk, ProviderMessage, ProviderRequest, Role, ToolDefinition, Usage};

use async_trait::async_trait;
use futures_core::stream::BoxStream;

/// A finite, single-pass stream of [`Chunk`]s. Dropping the stream before
/// it completes is how the coordinator cancels a provider call; concrete
/// providers must release their upstream connection promptly when this
/// happens.
pub type ChunkStream = BoxStream<'static, Result<Chunk, ProviderError>>;

/// Uniform streaming interface implemented by each concrete model backend.
///
/// Implementations are typically cheap to clone (an HTTP client plus
/// static config) and are shared behind an `Arc<dyn Provider>` by callers
/// that need dynamic dispatch across configured backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streaming chat completion. The returned stream yields `Text`
    /// chunks in generation order, zero or more `Usage` snapshots (the last
    /// one before `End` authoritative), then exactly one `End`.
    ///
    /// On failure before any chunk is produced, returns `Err` directly;
    /// mid-stream failures instead surface as an `Err` item from the
    /// stream, which terminates it.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError>;

    /// The model identifier this provider instance talks to, for logging
    /// and for `Turn` bookkeeping that wants to record which model
    /// produced a given turn.
    fn model_id(&self) -> &str;
}
