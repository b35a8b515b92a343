//! # mandrake-provider-anthropic — Anthropic Messages API streaming provider
//!
//! Implements `mandrake_provider::Provider` against Anthropic's Messages API
//! in streaming mode. Tool calls the model makes through Anthropic's native
//! function-calling are re-rendered into the XML-like grammar
//! `mandrake-parser` expects (see [`mapping::tool_use_to_xml`]), so the rest
//! of the pipeline never needs to know which path produced them.

#![deny(missing_docs)]

mod client;
mod error;
mod mapping;
mod streaming;
mod types;

pub use client::AnthropicProvider;

/// Price tables for the Anthropic models this provider is known to serve,
/// for use with `mandrake_provider::ModelPrice::cost`.
pub mod prices {
    use mandrake_provider::ModelPrice;
    use rust_decimal_macros::dec;

    /// Claude Haiku 4.5: $0.25 / $1.25 per million input/output tokens.
    pub const HAIKU_4_5: ModelPrice = ModelPrice {
        input_per_million: dec!(0.25),
        output_per_million: dec!(1.25),
        cache_read_per_million: Some(dec!(0.03)),
        cache_write_per_million: Some(dec!(0.3125)),
    };

    /// Claude Sonnet 4.5: $3 / $15 per million input/output tokens.
    pub const SONNET_4_5: ModelPrice = ModelPrice {
        input_per_million: dec!(3),
        output_per_million: dec!(15),
        cache_read_per_million: Some(dec!(0.3)),
        cache_write_per_million: Some(dec!(3.75)),
    };
}
