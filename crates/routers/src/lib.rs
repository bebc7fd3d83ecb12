//! Routers: actors that rewrite the remaining route instead of enriching
//! the payload.
//!
//! The [`DecisionRouter`] inspects the classification and picks the rest of
//! the pipeline. The [`EscalationRouter`] is the error handler of every
//! route: it retries retriable faults, hands conversations over to humans
//! and synthesises fallback notices.

pub mod cancel;
pub mod decision;
pub mod escalation;
pub mod handoff;
pub mod ttl_cache;

pub use {
    cancel::{Cancellations, listen_for_cancellations},
    decision::{DecisionRouter, DecisionSettings, Rule},
    escalation::{EscalationRouter, fallback_notice, handoff_notice},
    handoff::{HandoffQueue, HandoffTicket},
    ttl_cache::TtlCache,
};
