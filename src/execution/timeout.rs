//! Adaptive Timeout Policy
//!
//! Each command category starts at its configured base budget. Recent
//! completion latencies move the budget: a command that needed most of its
//! budget (or ran out of it) grows the budget, a full window of commands
//! that finished far under it shrinks the budget. Budgets always stay
//! inside the category's configured bounds.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::models::CommandCategory;

#[derive(Debug, Clone)]
struct CategoryState {
    budget: Duration,
    min: Duration,
    max: Duration,
    samples: VecDeque<Duration>,
}

impl CategoryState {
    fn scale(&mut self, factor: f64) {
        let scaled = self.budget.mul_f64(factor);
        self.budget = scaled.clamp(self.min, self.max);
        self.samples.clear();
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveTimeoutPolicy {
    config: TimeoutConfig,
    categories: HashMap<CommandCategory, CategoryState>,
}

impl AdaptiveTimeoutPolicy {
    pub fn new(config: TimeoutConfig) -> Self {
        let categories = CommandCategory::ALL
            .iter()
            .map(|&category| {
                let bounds = config.for_category(category);
                let state = CategoryState {
                    budget: bounds.base().clamp(bounds.min(), bounds.max()),
                    min: bounds.min(),
                    max: bounds.max(),
                    samples: VecDeque::with_capacity(config.history_window),
                };
                (category, state)
            })
            .collect();

        Self { config, categories }
    }

    /// Current budget for a category
    pub fn budget_for(&self, category: CommandCategory) -> Duration {
        self.categories
            .get(&category)
            .map(|state| state.budget)
            .unwrap_or_else(|| self.config.for_category(category).base())
    }

    /// Feed the latency of a command that completed in time
    pub fn record_completion(&mut self, category: CommandCategory, elapsed: Duration) {
        let window = self.config.history_window.max(1);
        let (slow_ratio, fast_ratio) = (self.config.slow_ratio, self.config.fast_ratio);
        let (grow, shrink) = (self.config.grow_factor, self.config.shrink_factor);

        let Some(state) = self.categories.get_mut(&category) else {
            return;
        };

        state.samples.push_back(elapsed);
        while state.samples.len() > window {
            state.samples.pop_front();
        }

        let before = state.budget;
        let slow = state.budget.mul_f64(slow_ratio);
        let fast = state.budget.mul_f64(fast_ratio);

        if state.samples.iter().any(|&s| s > slow) {
            state.scale(grow);
        } else if state.samples.len() == window && state.samples.iter().all(|&s| s < fast) {
            state.scale(shrink);
        }

        if state.budget != before {
            debug!(
                category = %category,
                from_ms = before.as_millis() as u64,
                to_ms = state.budget.as_millis() as u64,
                "Timeout budget adjusted"
            );
        }
    }

    /// A command ran out of budget; give the category more room
    pub fn record_timeout(&mut self, category: CommandCategory) {
        let grow = self.config.grow_factor;
        if let Some(state) = self.categories.get_mut(&category) {
            let before = state.budget;
            state.scale(grow);
            debug!(
                category = %category,
                from_ms = before.as_millis() as u64,
                to_ms = state.budget.as_millis() as u64,
                "Timeout budget grown after timeout"
            );
        }
    }

    /// Recent samples for a category, oldest first
    pub fn history(&self, category: CommandCategory) -> Vec<Duration> {
        self.categories
            .get(&category)
            .map(|state| state.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}
