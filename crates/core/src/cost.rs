use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Price per 1M tokens, by token category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelPrice {
    /// Cost per 1M input tokens in USD.
    pub input: f64,
    /// Cost per 1M output tokens in USD.
    pub output: f64,
    /// Cost per 1M cache-creation tokens. Defaults to 1.25x input.
    #[serde(default)]
    pub cache_write: Option<f64>,
    /// Cost per 1M cache-read tokens. Defaults to 0.1x input.
    #[serde(default)]
    pub cache_read: Option<f64>,
}

impl ModelPrice {
    fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            cache_write: None,
            cache_read: None,
        }
    }

    fn cache_write_rate(&self) -> f64 {
        self.cache_write.unwrap_or(self.input * 1.25)
    }

    fn cache_read_rate(&self) -> f64 {
        self.cache_read.unwrap_or(self.input * 0.1)
    }
}

/// Token counts of a single call, by category.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// Cost calculator with built-in price table and config overrides.
pub struct CostCalculator {
    prices: RwLock<HashMap<String, ModelPrice>>,
}

impl CostCalculator {
    pub fn new(overrides: &HashMap<String, ModelPrice>) -> Self {
        Self {
            prices: RwLock::new(merged_prices(overrides)),
        }
    }

    /// Replace overrides (called on hot-reload).
    pub fn update_prices(&self, overrides: &HashMap<String, ModelPrice>) {
        if let Ok(mut p) = self.prices.write() {
            *p = merged_prices(overrides);
        }
    }

    /// Nominal cost of a call in USD, or None for a model with no price.
    pub fn calculate(&self, model: &str, tokens: &TokenCounts) -> Option<f64> {
        let prices = self.prices.read().ok()?;

        // Exact match first, then without a provider prefix ("anthropic/claude-..." → "claude-...")
        let price = prices.get(model).or_else(|| {
            let stripped = model.split('/').next_back().unwrap_or(model);
            prices.get(stripped)
        })?;

        let per_token = |count: u64, rate: f64| (count as f64 / 1_000_000.0) * rate;

        Some(
            per_token(tokens.input, price.input)
                + per_token(tokens.output, price.output)
                + per_token(tokens.cache_creation, price.cache_write_rate())
                + per_token(tokens.cache_read, price.cache_read_rate()),
        )
    }
}

fn merged_prices(overrides: &HashMap<String, ModelPrice>) -> HashMap<String, ModelPrice> {
    let mut prices = built_in_prices();
    for (model, price) in overrides {
        prices.insert(model.clone(), price.clone());
    }
    prices
}

/// Built-in price table (USD per 1M tokens).
fn built_in_prices() -> HashMap<String, ModelPrice> {
    let entries: Vec<(&str, f64, f64)> = vec![
        ("claude-opus-4-5", 5.0, 25.0),
        ("claude-opus-4-1", 15.0, 75.0),
        ("claude-opus-4-20250514", 15.0, 75.0),
        ("claude-sonnet-4-5", 3.0, 15.0),
        ("claude-sonnet-4-20250514", 3.0, 15.0),
        ("claude-haiku-4-5", 1.0, 5.0),
        ("claude-3-5-haiku-20241022", 0.80, 4.0),
        ("gpt-4o", 2.50, 10.0),
        ("gpt-4o-mini", 0.15, 0.60),
        ("gpt-4.1", 2.0, 8.0),
        ("o3", 2.0, 8.0),
        ("o4-mini", 1.10, 4.40),
        ("gemini-2.5-pro", 1.25, 10.0),
        ("gemini-2.5-flash", 0.30, 2.50),
        ("gemini-2.0-flash", 0.10, 0.40),
    ];

    entries
        .into_iter()
        .map(|(model, input, output)| (model.to_string(), ModelPrice::new(input, output)))
        .collect()
}
