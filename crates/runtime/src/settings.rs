use std::{collections::HashMap, time::Duration};

use {switchyard_config::SwitchyardConfig, switchyard_protocol::addresses};

/// Bounded exponential backoff for a single hop's publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    /// Total attempts including the first.
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base: Duration::from_millis(50),
            max: Duration::from_millis(1_000),
        }
    }
}

impl PublishPolicy {
    /// Delay after the `failed`-th failed attempt (1-based).
    pub fn backoff(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub aggregation_address: String,
    pub max_in_flight: usize,
    pub default_budget: Duration,
    pub stage_budgets: HashMap<String, Duration>,
    pub publish: PublishPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            aggregation_address: addresses::AGGREGATION.into(),
            max_in_flight: 16,
            default_budget: Duration::from_millis(5_000),
            stage_budgets: HashMap::new(),
            publish: PublishPolicy::default(),
        }
    }
}

impl RuntimeSettings {
    pub fn budget_for(&self, address: &str) -> Duration {
        self.stage_budgets
            .get(address)
            .copied()
            .unwrap_or(self.default_budget)
    }

    #[must_use]
    pub fn with_budget(mut self, address: impl Into<String>, budget: Duration) -> Self {
        self.stage_budgets.insert(address.into(), budget);
        self
    }
}

impl From<&SwitchyardConfig> for RuntimeSettings {
    fn from(config: &SwitchyardConfig) -> Self {
        Self {
            aggregation_address: config.pipeline.aggregation_address.clone(),
            max_in_flight: config.runtime.max_in_flight.max(1),
            default_budget: Duration::from_millis(config.runtime.default_budget_ms),
            stage_budgets: config
                .runtime
                .stage_budgets_ms
                .iter()
                .map(|(k, v)| (k.clone(), Duration::from_millis(*v)))
                .collect(),
            publish: PublishPolicy {
                attempts: config.broker.publish_attempts.max(1),
                base: Duration::from_millis(config.broker.publish_backoff_ms),
                max: Duration::from_millis(config.broker.publish_backoff_max_ms),
            },
        }
    }
}
