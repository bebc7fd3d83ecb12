//! Config schema. Every section carries `#[serde(default)]`, so an empty
//! file yields a runnable mesh.

use std::{collections::BTreeMap, time::Duration};

use {
    serde::{Deserialize, Serialize},
    switchyard_protocol::addresses,
};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub pipeline: PipelineConfig,
    pub runtime: RuntimeConfig,
    pub decision: DecisionConfig,
    pub escalation: EscalationConfig,
    pub gateway: GatewayConfig,
    pub metrics: MetricsConfig,
}

/// HTTP/WebSocket listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8700,
        }
    }
}

/// Per-hop publish retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Total publish attempts per hop, including the first.
    pub publish_attempts: u32,
    pub publish_backoff_ms: u64,
    pub publish_backoff_max_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            publish_attempts: 4,
            publish_backoff_ms: 50,
            publish_backoff_max_ms: 1_000,
        }
    }
}

/// Default route stamped onto every new envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub steps: Vec<String>,
    pub error_handler: String,
    pub aggregation_address: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            steps: addresses::default_pipeline(),
            error_handler: addresses::ESCALATION_ROUTER.into(),
            aggregation_address: addresses::AGGREGATION.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Concurrent deliveries processed per actor.
    pub max_in_flight: usize,
    /// Execution budget per stage address, in milliseconds.
    pub stage_budgets_ms: BTreeMap<String, u64>,
    pub default_budget_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            stage_budgets_ms: BTreeMap::new(),
            default_budget_ms: 5_000,
        }
    }
}

impl RuntimeConfig {
    pub fn budget_for(&self, address: &str) -> Duration {
        Duration::from_millis(
            self.stage_budgets_ms
                .get(address)
                .copied()
                .unwrap_or(self.default_budget_ms),
        )
    }

    /// Largest budget any stage can be given.
    pub fn max_budget_ms(&self) -> u64 {
        self.stage_budgets_ms
            .values()
            .copied()
            .chain(std::iter::once(self.default_budget_ms))
            .max()
            .unwrap_or(self.default_budget_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Classifications below this confidence are escalated.
    pub confidence_threshold: f64,
    pub action_address: String,
    pub escalation_address: String,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            action_address: addresses::EXECUTION.into(),
            escalation_address: addresses::ESCALATION_ROUTER.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Retries allowed per faulting step.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// How long a cancelled `message_id` is remembered.
    pub cancellation_ttl_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
            cancellation_ttl_secs: 300,
        }
    }
}

impl EscalationConfig {
    /// `min(base * 2^retry_count, max)`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// End-to-end deadline per request. Must exceed every stage budget.
    pub request_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Consecutive unanswered probes before a connection is dropped.
    pub heartbeat_max_missed: u32,
    pub max_frame_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            heartbeat_interval_ms: switchyard_protocol::HEARTBEAT_INTERVAL_MS,
            heartbeat_max_missed: switchyard_protocol::HEARTBEAT_MAX_MISSED,
            max_frame_bytes: switchyard_protocol::MAX_FRAME_BYTES,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `GET /metrics` when the binary is built with Prometheus support.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
