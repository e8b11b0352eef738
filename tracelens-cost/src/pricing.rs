// Copyright 2025 TraceLens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Editable pricing table, USD per million tokens

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use tracelens_core::LlmCall;

/// Price for one (vendor, model) pair, USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrice {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPrice {
    pub const fn new(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            input_per_1m,
            output_per_1m,
        }
    }

    /// Cost for a token split.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_1m
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_1m
    }
}

/// Built-in pricing (as of 2025-01), keyed by (vendor, model).
static BUILTIN_PRICES: Lazy<HashMap<(&'static str, &'static str), ModelPrice>> = Lazy::new(|| {
    let mut db = HashMap::new();

    // OpenAI
    db.insert(("openai", "gpt-4o"), ModelPrice::new(2.50, 10.00));
    db.insert(("openai", "gpt-4o-mini"), ModelPrice::new(0.15, 0.60));
    db.insert(("openai", "gpt-4-turbo"), ModelPrice::new(10.00, 30.00));
    db.insert(("openai", "gpt-3.5-turbo"), ModelPrice::new(0.50, 1.50));
    db.insert(("openai", "o1-mini"), ModelPrice::new(3.00, 12.00));

    // Anthropic
    db.insert(("anthropic", "claude-3-opus"), ModelPrice::new(15.00, 75.00));
    db.insert(
        ("anthropic", "claude-3-5-sonnet"),
        ModelPrice::new(3.00, 15.00),
    );
    db.insert(
        ("anthropic", "claude-3-haiku"),
        ModelPrice::new(0.25, 1.25),
    );

    // Google
    db.insert(("google", "gemini-1.5-pro"), ModelPrice::new(3.50, 10.50));
    db.insert(
        ("google", "gemini-1.5-flash"),
        ModelPrice::new(0.075, 0.30),
    );

    // Cohere
    db.insert(("cohere", "command-r-plus"), ModelPrice::new(3.00, 15.00));
    db.insert(("cohere", "command-r"), ModelPrice::new(0.50, 1.50));

    db
});

/// Editable pricing table seeded from the built-in defaults. Lookups miss for
/// unknown pairs; the caller treats a miss as $0 and reports the pair as
/// unpriced.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<(String, String), ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let entries = BUILTIN_PRICES
            .iter()
            .map(|((vendor, model), price)| ((vendor.to_string(), model.to_string()), *price))
            .collect();
        Self { entries }
    }
}

impl PricingTable {
    /// Table with no built-in entries.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or overwrite an entry.
    pub fn set(
        &mut self,
        vendor: impl Into<String>,
        model: impl Into<String>,
        price: ModelPrice,
    ) {
        self.entries.insert((vendor.into(), model.into()), price);
    }

    pub fn get(&self, vendor: &str, model: &str) -> Option<ModelPrice> {
        self.entries
            .get(&(vendor.to_string(), model.to_string()))
            .copied()
    }

    /// Cost for one model call; `None` when the pair is unpriced.
    pub fn cost_for(&self, llm: &LlmCall) -> Option<f64> {
        self.get(&llm.vendor, &llm.model)
            .map(|price| price.cost(llm.prompt_tokens, llm.completion_tokens))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
