//! Wire-level definitions shared by every participant in the mesh.
//!
//! - [`Envelope`]: the routed unit of work (identity + route + payload + metadata)
//! - [`Route`]: ordered, cursor-driven execution plan
//! - [`Payload`]: append-only enrichment container with one slot per stage kind
//! - [`frames`]: JSON frames spoken by streaming (WebSocket) clients
//!
//! Addresses are plain strings. The well-known ones live in [`addresses`].

pub mod envelope;
pub mod fault;
pub mod frames;
pub mod payload;
pub mod response;
pub mod route;
pub mod slots;

pub use {
    envelope::{ControlMessage, Envelope, HopRecord, Metadata, Origin, RouteDecisionRecord},
    fault::{FaultDescriptor, FaultKind},
    frames::{
        ErrorShape, EventFrame, GatewayFrame, RequestFrame, ResponseFrame, SubmitParams,
        error_codes, events, methods,
    },
    payload::{Payload, PayloadPatch, ProtocolViolation, Slot, StageKind},
    response::{GENERIC_FALLBACK_TEXT, GatewayResponse, ResolutionStatus, SubmitRequest, TIMED_OUT_TEXT},
    route::{Route, RouteBoundsError},
    slots::{
        ActionResult, Classification, CustomerContext, CustomerProfile, CustomerTier, Draft,
        Entities, EscalationOutcome, EscalationRecord, EscalationState, ExecutionReport,
        GuardrailIssue, IssueSeverity, OrderSummary, Sentiment, SentimentLabel, Urgency,
        ValidationReport,
    },
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_BYTES: usize = 65_536;
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const HEARTBEAT_MAX_MISSED: u32 = 3;

/// Well-known mailbox addresses.
pub mod addresses {
    pub const CLASSIFICATION: &str = "classification-stage";
    pub const ENTITIES: &str = "entity-stage";
    pub const CONTEXT: &str = "context-stage";
    pub const DRAFTING: &str = "drafting-stage";
    pub const VALIDATION: &str = "validation-stage";
    pub const EXECUTION: &str = "execution-stage";
    pub const DECISION_ROUTER: &str = "decision-router";
    pub const ESCALATION_ROUTER: &str = "escalation-router";
    /// Single terminal destination every envelope converges on.
    pub const AGGREGATION: &str = "aggregation";
    /// Out-of-band cancellation notices published by the gateway.
    pub const CONTROL_CANCEL: &str = "control.cancel";

    /// Default pipeline for a fresh customer request.
    #[must_use]
    pub fn default_pipeline() -> Vec<String> {
        [
            CLASSIFICATION,
            DECISION_ROUTER,
            ENTITIES,
            CONTEXT,
            DRAFTING,
            VALIDATION,
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}
