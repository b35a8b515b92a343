//! Multi-provider: the same request streamed through Anthropic and a
//! local Ollama model, showing the `Provider` trait is the only thing
//! either one needs to implement.
//!
//! Set ANTHROPIC_API_KEY and have `ollama serve` running locally with
//! `llama3.2` pulled, then run:
//!
//! ```sh
//! cargo run --example multi_provider -p mandrake --features providers-all
//! ```

use futures_util::StreamExt;
use mandrake_provider::{Chunk, Provider, ProviderMessage, ProviderRequest};
use mandrake_provider_anthropic::AnthropicProvider;
use mandrake_provider_ollama::OllamaProvider;

async fn ask(name: &str, provider: &dyn Provider, request: ProviderRequest) {
    println!("--- {name} ({}) ---", provider.model_id());
    let mut stream = match provider.stream(request).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error from {name}: {e}");
            return;
        }
    };

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(Chunk::Text(delta)) => text.push_str(&delta),
            Ok(Chunk::Usage(usage)) => {
                println!(
                    "usage: {} input / {} output tokens",
                    usage.input_tokens, usage.output_tokens
                );
            }
            Ok(Chunk::End) => break,
            Err(e) => {
                eprintln!("stream error from {name}: {e}");
                break;
            }
        }
    }
    println!("response: {text}\n");
}

#[tokio::main]
async fn main() {
    let request = || ProviderRequest {
        system: String::new(),
        messages: vec![ProviderMessage::user(
            "In one sentence, what is the theory of relativity?",
        )],
        tools: vec![],
        max_tokens: Some(256),
        temperature: None,
    };

    let anthropic_key = std::env::var("ANTHROPIC_API_KEY")
        .expect("ANTHROPIC_API_KEY environment variable must be set");
    let anthropic = AnthropicProvider::new(anthropic_key, "claude-haiku-4-5-20251001");
    ask("Anthropic", &anthropic, request()).await;

    let ollama = OllamaProvider::new("llama3.2");
    ask("Ollama", &ollama, request()).await;
}
