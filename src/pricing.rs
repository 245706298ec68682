//! Model pricing and context window lookup
//!
//! Static mapping from model identifier to per-million-token prices and
//! context window size. Lookups never fail: unlisted models fall back to
//! [`DEFAULT_PRICE_PER_MILLION`] and [`DEFAULT_CONTEXT_WINDOW`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Price per million tokens (input and output) for unlisted models
pub const DEFAULT_PRICE_PER_MILLION: f64 = 0.10;

/// Context window for unlisted models
pub const DEFAULT_CONTEXT_WINDOW: u32 = 8192;

/// Cost per 1M tokens in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Calculate cost for given token counts
    pub fn calculate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let input_cost = (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million;
        let output_cost = (completion_tokens as f64 / 1_000_000.0) * self.output_per_million;
        input_cost + output_cost
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::new(DEFAULT_PRICE_PER_MILLION, DEFAULT_PRICE_PER_MILLION)
    }
}

/// Pricing and limits for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub pricing: ModelPricing,
    pub context_window: u32,
}

impl ModelInfo {
    pub fn new(input_per_million: f64, output_per_million: f64, context_window: u32) -> Self {
        Self {
            pricing: ModelPricing::new(input_per_million, output_per_million),
            context_window,
        }
    }
}

/// Read-only model catalog consumed by the statistics engine
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelInfo>,
}

impl PricingTable {
    /// Create an empty table (every lookup uses the defaults)
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Add or replace a model entry
    pub fn insert(&mut self, model_id: impl Into<String>, info: ModelInfo) {
        self.models.insert(model_id.into(), info);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_model(mut self, model_id: impl Into<String>, info: ModelInfo) -> Self {
        self.insert(model_id, info);
        self
    }

    /// Look up a listed model
    pub fn get(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Prices for a model, or the default price when unlisted
    pub fn pricing_for(&self, model_id: &str) -> ModelPricing {
        self.get(model_id)
            .map(|info| info.pricing)
            .unwrap_or_default()
    }

    /// Context window for a model, or [`DEFAULT_CONTEXT_WINDOW`] when unlisted
    pub fn context_window_for(&self, model_id: &str) -> u32 {
        self.get(model_id)
            .map(|info| info.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    pub fn calculate_cost(&self, model_id: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        self.pricing_for(model_id)
            .calculate_cost(prompt_tokens, completion_tokens)
    }

    /// Listed model ids, sorted
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for PricingTable {
    /// Registry of known model pricing
    fn default() -> Self {
        let mut table = Self::empty();

        // Anthropic
        table.insert("anthropic/claude-3.5-sonnet", ModelInfo::new(3.0, 15.0, 200_000));
        table.insert("anthropic/claude-3-haiku", ModelInfo::new(0.25, 1.25, 200_000));
        table.insert("anthropic/claude-3-opus", ModelInfo::new(15.0, 75.0, 200_000));
        table.insert("claude-sonnet-4-20250514", ModelInfo::new(3.0, 15.0, 200_000));

        // OpenAI
        table.insert("openai/gpt-4o", ModelInfo::new(2.5, 10.0, 128_000));
        table.insert("openai/gpt-4o-mini", ModelInfo::new(0.15, 0.6, 128_000));
        table.insert("openai/gpt-4-turbo", ModelInfo::new(10.0, 30.0, 128_000));

        // Google
        table.insert("google/gemini-pro-1.5", ModelInfo::new(1.25, 5.0, 2_000_000));
        table.insert("google/gemini-flash-1.5", ModelInfo::new(0.075, 0.3, 1_000_000));

        // Open weights
        table.insert("meta-llama/llama-3.1-8b-instruct", ModelInfo::new(0.05, 0.05, 131_072));
        table.insert("meta-llama/llama-3.1-70b-instruct", ModelInfo::new(0.35, 0.4, 131_072));
        table.insert("mistralai/mistral-7b-instruct", ModelInfo::new(0.06, 0.06, 32_768));
        table.insert("deepseek/deepseek-chat", ModelInfo::new(0.14, 0.28, 64_000));
        table.insert("qwen/qwen-2.5-coder-32b-instruct", ModelInfo::new(0.18, 0.18, 32_768));

        table
    }
}
