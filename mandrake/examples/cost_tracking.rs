//! Cost accounting: providers never report cost directly — a model's
//! [`ModelPrice`] table turns its final `Usage` snapshot into a `Decimal`
//! cost, which is what ends up on a persisted `Turn`'s metrics.
//!
//! No network access required; this drives a hand-written provider that
//! streams a fixed response with a realistic token count.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example cost_tracking -p mandrake
//! ```

use async_trait::async_trait;
use futures_util::stream;
use mandrake::prelude::*;
use mandrake_provider::{Chunk, ChunkStream, ProviderRequest, Usage};
use rust_decimal_macros::dec;

struct FixedCostProvider;

#[async_trait]
impl Provider for FixedCostProvider {
    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        Ok(Box::pin(stream::iter(vec![
            Ok(Chunk::Text("The capital of France is Paris.".into())),
            Ok(Chunk::Usage(Usage {
                input_tokens: 1_200,
                output_tokens: 340,
                cache_read_tokens: Some(900),
                cache_write_tokens: None,
            })),
            Ok(Chunk::End),
        ])))
    }

    fn model_id(&self) -> &str {
        "fixed-cost-demo"
    }
}

#[tokio::main]
async fn main() {
    use futures_util::StreamExt;

    let price = ModelPrice {
        input_per_million: dec!(3),
        output_per_million: dec!(15),
        cache_read_per_million: Some(dec!(0.3)),
        cache_write_per_million: Some(dec!(3.75)),
    };

    let provider = FixedCostProvider;
    let request = ProviderRequest {
        system: String::new(),
        messages: vec![],
        tools: vec![],
        max_tokens: None,
        temperature: None,
    };

    let mut stream = provider.stream(request).await.unwrap();
    let mut usage = Usage::default();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk.unwrap() {
            Chunk::Text(delta) => text.push_str(&delta),
            Chunk::Usage(u) => usage = u,
            Chunk::End => break,
        }
    }

    let cost = price.cost(&usage);
    println!("response: {text}");
    println!(
        "usage: {} in / {} out ({} cache-read)",
        usage.input_tokens,
        usage.output_tokens,
        usage.cache_read_tokens.unwrap_or(0)
    );
    println!("cost: ${cost}");
}
