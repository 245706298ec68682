//! Session statistics engine
//!
//! Accumulates token counts and running cost for the live session using
//! the [`PricingTable`].

use crate::pricing::PricingTable;
use crate::types::SessionStats;
use std::sync::Arc;

/// Token and cost accumulator for the live session
#[derive(Debug, Clone)]
pub struct SessionStatsEngine {
    pricing: Arc<PricingTable>,
    stats: SessionStats,
}

impl SessionStatsEngine {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self {
            pricing,
            stats: SessionStats::default(),
        }
    }

    /// Record one exchange and return the cost it added
    ///
    /// Unlisted models are priced at the default rate. `messageCount`
    /// increments even when both token counts are zero.
    pub fn record_usage(&mut self, prompt_tokens: u64, completion_tokens: u64, model_id: &str) -> f64 {
        let cost = self
            .pricing
            .calculate_cost(model_id, prompt_tokens, completion_tokens);

        self.stats.total_prompt_tokens += prompt_tokens;
        self.stats.total_completion_tokens += completion_tokens;
        self.stats.total_tokens += prompt_tokens + completion_tokens;
        self.stats.total_cost += cost;
        self.stats.message_count += 1;

        tracing::debug!(
            model = model_id,
            prompt_tokens,
            completion_tokens,
            cost,
            total_cost = self.stats.total_cost,
            "Usage recorded"
        );

        cost
    }

    /// Zero all counters; only called when a new live session begins
    pub fn reset_session_stats(&mut self) {
        self.stats = SessionStats::default();
    }

    /// Seed totals from an archived session
    ///
    /// Prompt/completion counters start at zero since they only track the
    /// live session's own accounting.
    pub fn restore_totals(&mut self, total_tokens: u64, total_cost: f64, message_count: u64) {
        self.stats = SessionStats {
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_tokens,
            total_cost,
            message_count,
        };
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn context_window_for(&self, model_id: &str) -> u32 {
        self.pricing.context_window_for(model_id)
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }
}
