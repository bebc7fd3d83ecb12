//! Failure and recovery state machine.
//!
//! `received -> retrying -> {resolved, human_handoff, fallback_emitted}`.
//!
//! The router is the error handler of every route. A faulted envelope is
//! either retried at the step that failed or closed with a fallback notice;
//! an envelope routed here without a fault is handed over to a human. Each
//! terminal transition writes the escalation slot once, so an envelope that
//! already carries a record is passed straight on to aggregation.

use std::{sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    chrono::Utc,
    switchyard_config::EscalationConfig,
    switchyard_metrics::{counter, labels, routing},
    switchyard_protocol::{
        CustomerTier, Envelope, EscalationOutcome, EscalationRecord, EscalationState,
        FaultDescriptor, PayloadPatch, Slot, Urgency, addresses,
    },
    switchyard_runtime::{Dispatch, Router},
    tracing::{debug, error, info, warn},
};

use crate::{
    cancel::Cancellations,
    decision::Rule,
    handoff::{HandoffQueue, HandoffTicket},
};

const LEGAL_THREAT: &str = "legal_threat";

pub struct EscalationRouter {
    config: EscalationConfig,
    queue: Arc<HandoffQueue>,
    cancellations: Arc<Cancellations>,
}

impl EscalationRouter {
    pub fn new(
        config: EscalationConfig,
        queue: Arc<HandoffQueue>,
        cancellations: Arc<Cancellations>,
    ) -> Self {
        Self {
            config,
            queue,
            cancellations,
        }
    }

    async fn recover(
        &self,
        mut envelope: Envelope,
        fault: FaultDescriptor,
        started: Instant,
    ) -> Dispatch {
        let retries = envelope.metadata.retries_for(&fault.step);
        let retry_route = envelope.route.retry_at(&fault.step);

        let retry = match retry_route {
            Some(route)
                if fault.retriable
                    && retries < self.config.max_retries
                    && !self.cancellations.is_cancelled(&envelope.message_id) =>
            {
                route
            },
            _ => return self.fallback(envelope, fault, started),
        };

        let delay = self.config.backoff(retries);
        info!(
            message_id = %envelope.message_id,
            step = %fault.step,
            kind = %fault.kind,
            retry = retries + 1,
            max_retries = self.config.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying faulted step"
        );
        counter!(routing::ESCALATIONS_TOTAL, labels::OUTCOME => "retrying").increment(1);
        tokio::time::sleep(delay).await;

        // The caller may have left while we were backing off.
        if self.cancellations.is_cancelled(&envelope.message_id) {
            return self.fallback(envelope, fault, started);
        }

        envelope.metadata.bump_retry(&fault.step);
        envelope.metadata.escalation_state = Some(EscalationState::Retrying);
        envelope.payload.error = None;
        envelope.route = retry;
        Dispatch::Divert(envelope)
    }

    fn fallback(&self, envelope: Envelope, fault: FaultDescriptor, started: Instant) -> Dispatch {
        let attempts = envelope.metadata.retries_for(&fault.step);
        let cancelled = self.cancellations.is_cancelled(&envelope.message_id);
        let reason = if cancelled {
            "request cancelled by caller".to_string()
        } else if !fault.retriable {
            format!("non-retriable {} fault at {}", fault.kind, fault.step)
        } else if envelope.route.retry_at(&fault.step).is_none() {
            format!("{} fault at {}, which is not on the route", fault.kind, fault.step)
        } else {
            format!(
                "{} fault at {} persisted after {attempts} retries",
                fault.kind, fault.step
            )
        };
        warn!(message_id = %envelope.message_id, %reason, "emitting fallback response");

        let intent = envelope
            .payload
            .classification
            .as_ref()
            .map(|c| c.intent.as_str())
            .unwrap_or_default();
        let record = EscalationRecord {
            outcome: EscalationOutcome::FallbackEmitted,
            reason,
            cause: Some(fault),
            attempts,
            queue_position: None,
            estimated_wait: None,
            notice: fallback_notice(intent, envelope.reference_id()),
            recorded_at: Utc::now(),
        };
        self.close(envelope, record, started)
    }

    fn hand_off(&self, envelope: Envelope, started: Instant) -> Dispatch {
        let ticket = self.queue.enqueue(&envelope.message_id);
        let reason = handoff_reason(&envelope);
        info!(
            message_id = %envelope.message_id,
            %reason,
            position = ticket.position,
            "handing conversation to a human agent"
        );
        let record = EscalationRecord {
            outcome: EscalationOutcome::HumanHandoff,
            reason,
            cause: None,
            attempts: envelope.metadata.retry_count(),
            queue_position: Some(ticket.position),
            notice: handoff_notice(&ticket, envelope.reference_id()),
            estimated_wait: Some(ticket.estimated_wait),
            recorded_at: Utc::now(),
        };
        self.close(envelope, record, started)
    }

    /// Write the escalation slot and send the envelope to aggregation.
    fn close(&self, mut envelope: Envelope, record: EscalationRecord, started: Instant) -> Dispatch {
        let outcome = record.outcome;
        if let Err(violation) = envelope
            .payload
            .merge(PayloadPatch::escalation(record), Slot::Escalation)
        {
            error!(message_id = %envelope.message_id, %violation, "escalation record rejected");
            return Dispatch::Terminate(envelope);
        }
        envelope.metadata.escalation_state = Some(outcome.into());
        envelope.metadata.record_hop(
            self.address(),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        counter!(routing::ESCALATIONS_TOTAL, labels::OUTCOME => outcome_label(outcome))
            .increment(1);
        Dispatch::Terminate(envelope)
    }
}

#[async_trait]
impl Router for EscalationRouter {
    fn address(&self) -> &str {
        addresses::ESCALATION_ROUTER
    }

    fn handles_faults(&self) -> bool {
        true
    }

    async fn route(&self, mut envelope: Envelope) -> Dispatch {
        let started = Instant::now();
        if envelope.payload.escalation.is_some() {
            debug!(message_id = %envelope.message_id, "already escalated, forwarding to aggregation");
            return Dispatch::Terminate(envelope);
        }
        envelope.metadata.escalation_state = Some(EscalationState::Received);

        match envelope.payload.error.clone() {
            Some(fault) => self.recover(envelope, fault, started).await,
            None => self.hand_off(envelope, started),
        }
    }
}

fn outcome_label(outcome: EscalationOutcome) -> &'static str {
    match outcome {
        EscalationOutcome::HumanHandoff => "human_handoff",
        EscalationOutcome::FallbackEmitted => "fallback_emitted",
    }
}

/// Operator-facing reason for a handoff, from the signals that routed the
/// envelope here.
fn handoff_reason(envelope: &Envelope) -> String {
    let rule = envelope
        .metadata
        .route_decisions
        .last()
        .map(|d| d.rule.as_str());
    let classification = envelope.payload.classification.as_ref();

    if rule == Some(Rule::Critical.as_str()) {
        return match classification {
            Some(c) if c.intent == LEGAL_THREAT => "legal concern requiring human attention",
            Some(c) if c.urgency == Urgency::Critical => "critical urgency",
            Some(c) if c.customer_tier == Some(CustomerTier::Vip) => {
                "VIP customer with urgent issue"
            },
            _ => "sensitive issue requiring human attention",
        }
        .to_string();
    }
    if rule == Some(Rule::LowConfidence.as_str()) {
        let confidence = classification.map(|c| c.confidence).unwrap_or_default();
        return format!("low confidence in automated response ({confidence:.2})");
    }
    "general escalation".to_string()
}

/// Customer-facing text for a human handoff.
pub fn handoff_notice(ticket: &HandoffTicket, reference_id: &str) -> String {
    format!(
        "Thank you for contacting us. I'm connecting you with one of our customer service \
         representatives who will be able to help you further.\n\n\
         You are number {} in the queue. Expected wait time: {}.\n\n\
         Reference ID: {reference_id}",
        ticket.position, ticket.estimated_wait
    )
}

/// Customer-facing apology when automated handling gave up. Never includes
/// the underlying fault.
pub fn fallback_notice(intent: &str, reference_id: &str) -> String {
    let hint = match intent {
        "order_inquiry" | "delivery_issue" => {
            " In the meantime, your order confirmation email has your tracking details."
        },
        "billing_question" => " Our billing specialists will review your account with you.",
        _ => "",
    };
    format!(
        "We're sorry, we couldn't complete your request right now. A member of our support \
         team will follow up with you shortly.{hint}\n\nReference ID: {reference_id}"
    )
}
