//! Metric name and label definitions.

/// Actor runtime metrics
pub mod mesh {
    /// Deliveries processed, by actor address
    pub const HOPS_TOTAL: &str = "switchyard_hops_total";
    /// Stage faults, by address and fault kind
    pub const STAGE_FAULTS_TOTAL: &str = "switchyard_stage_faults_total";
    /// Publish attempts that had to be retried
    pub const TRANSPORT_RETRIES_TOTAL: &str = "switchyard_transport_retries_total";
    /// Slot rewrites, foreign slots, unknown addresses
    pub const PROTOCOL_VIOLATIONS_TOTAL: &str = "switchyard_protocol_violations_total";
    /// Deliveries dropped before processing (malformed or misdelivered)
    pub const DELIVERIES_DROPPED_TOTAL: &str = "switchyard_deliveries_dropped_total";
    /// Stage execution time in seconds
    pub const STAGE_DURATION_SECONDS: &str = "switchyard_stage_duration_seconds";
}

/// Router metrics
pub mod routing {
    /// Route mutations applied by the decision router, by rule
    pub const DECISIONS_TOTAL: &str = "switchyard_route_decisions_total";
    /// Escalation router transitions, by outcome
    pub const ESCALATIONS_TOTAL: &str = "switchyard_escalations_total";
}

/// Gateway metrics
pub mod gateway {
    /// Completed submits, by resolution status
    pub const REQUESTS_TOTAL: &str = "switchyard_gateway_requests_total";
    /// Aggregation deliveries with no waiting caller, by reason
    pub const DISCARDED_TOTAL: &str = "switchyard_gateway_discarded_total";
    /// Outstanding correlation entries
    pub const PENDING: &str = "switchyard_gateway_pending";
    /// End-to-end request latency in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "switchyard_gateway_request_duration_seconds";
    /// Open streaming connections
    pub const WS_CONNECTIONS_ACTIVE: &str = "switchyard_ws_connections_active";
    /// Connections dropped after missing heartbeat probes
    pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "switchyard_ws_heartbeat_timeouts_total";
}

pub mod labels {
    pub const ADDRESS: &str = "address";
    pub const KIND: &str = "kind";
    pub const RULE: &str = "rule";
    pub const OUTCOME: &str = "outcome";
    pub const STATUS: &str = "status";
    pub const REASON: &str = "reason";
}

/// Histogram buckets
pub mod buckets {
    /// Stage durations, in seconds
    pub const STAGE_DURATION: [f64; 10] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];
    /// End-to-end request durations, in seconds
    pub const REQUEST_DURATION: [f64; 10] = [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0];
}
