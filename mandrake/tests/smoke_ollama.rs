#![cfg(feature = "provider-ollama")]
//! Smoke tests against a local Ollama instance.
//!
//! These tests are `#[ignore]` by default. Run them with:
//!
//!     cargo test -p mandrake --features provider-ollama --test smoke_ollama -- --ignored
//!
//! They require a running Ollama server with the `llama3.2` model pulled.
//! Start Ollama first: `ollama serve` then `ollama pull llama3.2`.
//!
//! Tool calling is not exercised here — small local models are unreliable
//! at producing well-formed tool tags. These tests validate basic
//! streaming completion only.

use futures_util::StreamExt;
use mandrake_provider::{Chunk, Provider, ProviderMessage, ProviderRequest};
use mandrake_provider_ollama::OllamaProvider;

fn ollama() -> OllamaProvider {
    OllamaProvider::new("llama3.2")
}

#[tokio::test]
#[ignore = "requires local Ollama"]
async fn smoke_basic_completion() {
    let provider = ollama();
    let request = ProviderRequest {
        system: "You are a helpful assistant. Reply concisely with only the answer.".into(),
        messages: vec![ProviderMessage::user("What is 2+2? Reply with just the number.")],
        tools: vec![],
        max_tokens: Some(64),
        temperature: Some(0.0),
    };

    let mut stream = provider.stream(request).await.unwrap();
    let mut text = String::new();
    let mut saw_usage = false;
    let mut saw_end = false;

    while let Some(chunk) = stream.next().await {
        match chunk.unwrap() {
            Chunk::Text(delta) => text.push_str(&delta),
            Chunk::Usage(_) => saw_usage = true,
            Chunk::End => {
                saw_end = true;
                break;
            }
        }
    }

    println!("  response: {text}");
    assert!(text.contains('4'), "expected '4' in response, got: {text}");
    assert!(saw_usage, "expected a Usage chunk before End");
    assert!(saw_end, "expected a terminating End chunk");
}

#[tokio::test]
#[ignore = "requires local Ollama"]
async fn smoke_streaming_arrives_incrementally() {
    let provider = ollama();
    let request = ProviderRequest {
        system: String::new(),
        messages: vec![ProviderMessage::user(
            "Count from 1 to 5, separated by commas. Nothing else.",
        )],
        tools: vec![],
        max_tokens: Some(64),
        temperature: Some(0.0),
    };

    let mut stream = provider.stream(request).await.unwrap();
    let mut chunk_count = 0usize;
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        match chunk.unwrap() {
            Chunk::Text(delta) => {
                chunk_count += 1;
                text.push_str(&delta);
            }
            Chunk::Usage(_) => {}
            Chunk::End => break,
        }
    }

    println!("  streamed in {chunk_count} text chunks: {text}");
    assert!(chunk_count >= 1);
    assert!(text.contains('1') && text.contains('5'), "expected 1-5 in: {text}");
}
