//! # mandrake-provider-ollama — Ollama local model streaming provider
//!
//! Implements `mandrake_provider::Provider` against a local (or remote)
//! Ollama server's `/api/chat` endpoint in streaming mode. Ollama runs
//! models locally, so there is no authentication and, in practice, no
//! metered cost — callers that want a price table anyway can supply
//! [`ModelPrice::flat`](mandrake_provider::ModelPrice::flat) with zeros.

#![deny(missing_docs)]

mod client;
mod error;
mod mapping;
mod streaming;
mod types;

pub use client::OllamaProvider;
