//! Price tables and cost computation from a final [`Usage`] snapshot.
//!
//! Providers never report cost directly (§4.5); cost is always computed
//! here, from the model's configured per-token price, so that a change to
//! a price table doesn't require touching provider client code.

use crate::types::Usage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-million-token prices for one model, in the provider's billing
/// currency. `cache_read`/`cache_write` default to the input price when a
/// provider doesn't break pricing out separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per million input tokens.
    pub input_per_million: Decimal,
    /// Price per million output tokens.
    pub output_per_million: Decimal,
    /// Price per million cache-read tokens, if distinct from input price.
    pub cache_read_per_million: Option<Decimal>,
    /// Price per million cache-write tokens, if distinct from input price.
    pub cache_write_per_million: Option<Decimal>,
}

impl ModelPrice {
    /// A price table with no cache-specific pricing; cache tokens bill at
    /// the input rate.
    pub fn flat(input_per_million: Decimal, output_per_million: Decimal) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cache_read_per_million: None,
            cache_write_per_million: None,
        }
    }

    /// Compute the cost of `usage` against this price table. Never
    /// negative, per the `Turn.metrics.cost >= 0` invariant.
    pub fn cost(&self, usage: &Usage) -> Decimal {
        let million = Decimal::from(1_000_000u32);
        let input_cost = Decimal::from(usage.input_tokens) * self.input_per_million / million;
        let output_cost = Decimal::from(usage.output_tokens) * self.output_per_million / million;
        let cache_read_cost = usage
            .cache_read_tokens
            .map(|t| {
                let price = self.cache_read_per_million.unwrap_or(self.input_per_million);
                Decimal::from(t) * price / million
            })
            .unwrap_or(Decimal::ZERO);
        let cache_write_cost = usage
            .cache_write_tokens
            .map(|t| {
                let price = self.cache_write_per_million.unwrap_or(self.input_per_million);
                Decimal::from(t) * price / million
            })
            .unwrap_or(Decimal::ZERO);
        input_cost + output_cost + cache_read_cost + cache_write_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_price_has_no_cache_override() {
        let price = ModelPrice::flat(Decimal::new(3, 0), Decimal::new(15, 0));
        assert_eq!(price.cache_read_per_million, None);
    }

    #[test]
    fn cost_is_never_negative_for_zero_usage() {
        let price = ModelPrice::flat(Decimal::new(3, 0), Decimal::new(15, 0));
        let cost = price.cost(&Usage::default());
        assert_eq!(cost, Decimal::ZERO);
    }

    #[test]
    fn cost_scales_with_tokens() {
        let price = ModelPrice::flat(Decimal::new(3, 0), Decimal::new(15, 0));
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_read_tokens: None,
            cache_write_tokens: None,
        };
        assert_eq!(price.cost(&usage), Decimal::new(18, 0));
    }

    #[test]
    fn cache_read_bills_at_override_price_when_set() {
        let mut price = ModelPrice::flat(Decimal::new(3, 0), Decimal::new(15, 0));
        price.cache_read_per_million = Some(Decimal::new(30, 2));
        let usage = Usage {
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: Some(1_000_000),
            cache_write_tokens: None,
        };
        assert_eq!(price.cost(&usage), Decimal::new(30, 2));
    }
}
