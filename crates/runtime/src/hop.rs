//! Processing of a single delivery.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use {
    bytes::Bytes,
    futures::FutureExt,
    switchyard_broker::Broker,
    switchyard_metrics::{counter, histogram, labels, mesh},
    switchyard_protocol::{Envelope, FaultDescriptor, FaultKind, ProtocolViolation},
    tracing::{debug, error, warn},
};

use crate::{
    address_book::AddressBook,
    publish::publish_with_retry,
    settings::RuntimeSettings,
    stage::{Dispatch, Router, Stage, StageFault},
};

/// Logic hosted by one actor.
#[derive(Clone)]
pub enum Hosted {
    Stage(Arc<dyn Stage>),
    Router(Arc<dyn Router>),
}

impl Hosted {
    pub fn address(&self) -> &str {
        match self {
            Self::Stage(s) => s.address(),
            Self::Router(r) => r.address(),
        }
    }

    fn handles_faults(&self) -> bool {
        match self {
            Self::Stage(_) => false,
            Self::Router(r) => r.handles_faults(),
        }
    }
}

/// Everything an actor needs to process deliveries. Cheap to clone.
#[derive(Clone)]
pub struct Hop {
    hosted: Hosted,
    broker: Arc<dyn Broker>,
    book: Arc<AddressBook>,
    settings: Arc<RuntimeSettings>,
}

impl Hop {
    pub fn new(
        hosted: Hosted,
        broker: Arc<dyn Broker>,
        book: Arc<AddressBook>,
        settings: Arc<RuntimeSettings>,
    ) -> Self {
        Self {
            hosted,
            broker,
            book,
            settings,
        }
    }

    pub fn address(&self) -> &str {
        self.hosted.address()
    }

    /// Process one raw delivery. Never panics and never returns an error:
    /// every outcome is either a publish or a logged drop.
    pub async fn handle_delivery(&self, bytes: Bytes) {
        let address = self.address();
        let envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(address, error = %e, "dropping malformed delivery");
                counter!(mesh::DELIVERIES_DROPPED_TOTAL, labels::ADDRESS => address.to_string(), labels::REASON => "malformed")
                    .increment(1);
                return;
            },
        };

        // A faulted envelope may carry any cursor; its handler copes with that.
        if !self.is_fault_delivery(&envelope)
            && let Err(bounds) = envelope.route.check_bounds()
        {
            let attempt = envelope.metadata.retries_for(address) + 1;
            self.violation(envelope, bounds.into(), attempt).await;
            return;
        }

        if !self.accepts(&envelope) {
            warn!(
                address,
                message_id = %envelope.message_id,
                cursor = ?envelope.route.current(),
                "dropping misdelivered envelope"
            );
            counter!(mesh::DELIVERIES_DROPPED_TOTAL, labels::ADDRESS => address.to_string(), labels::REASON => "misdelivered")
                .increment(1);
            return;
        }

        counter!(mesh::HOPS_TOTAL, labels::ADDRESS => address.to_string()).increment(1);
        debug!(address, message_id = %envelope.message_id, step = envelope.route.current_step, "hop received");

        match &self.hosted {
            Hosted::Stage(stage) => self.run_stage(stage.as_ref(), envelope).await,
            Hosted::Router(router) => self.run_router(router.as_ref(), envelope).await,
        }
    }

    fn accepts(&self, envelope: &Envelope) -> bool {
        envelope.route.current() == Some(self.address()) || self.is_fault_delivery(envelope)
    }

    fn is_fault_delivery(&self, envelope: &Envelope) -> bool {
        self.hosted.handles_faults()
            && envelope.payload.error.is_some()
            && envelope.route.error_handler.as_deref() == Some(self.address())
    }

    // ── Stages ──────────────────────────────────────────────────────────────

    async fn run_stage(&self, stage: &dyn Stage, envelope: Envelope) {
        let address = stage.address();
        let attempt = envelope.metadata.retries_for(address) + 1;
        let budget = self.settings.budget_for(address);
        let started = Instant::now();

        let run = AssertUnwindSafe(stage.process(&envelope.payload)).catch_unwind();
        let result = match tokio::time::timeout(budget, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(StageFault::internal(format!(
                "stage panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(StageFault::new(
                FaultKind::Timeout,
                format!("exceeded {} ms budget", budget.as_millis()),
            )),
        };
        let elapsed = started.elapsed();
        histogram!(mesh::STAGE_DURATION_SECONDS, labels::ADDRESS => address.to_string())
            .record(elapsed.as_secs_f64());

        let patch = match result {
            Ok(patch) => patch,
            Err(fault) => {
                let descriptor = FaultDescriptor::new(address, fault.kind, fault.message, attempt);
                self.fail(envelope, descriptor).await;
                return;
            },
        };

        let mut next = envelope.clone();
        if let Err(violation) = next.payload.merge(patch, stage.kind().owned_slot()) {
            self.violation(envelope, violation, attempt).await;
            return;
        }
        next.metadata
            .record_hop(address, u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        next.route = next.route.advanced();
        self.forward(next, envelope, attempt).await;
    }

    // ── Routers ─────────────────────────────────────────────────────────────

    async fn run_router(&self, router: &dyn Router, envelope: Envelope) {
        let original = envelope.clone();
        let attempt = original.metadata.retries_for(router.address()) + 1;
        let dispatch = match AssertUnwindSafe(router.route(envelope)).catch_unwind().await {
            Ok(dispatch) => dispatch,
            Err(panic) => {
                let descriptor = FaultDescriptor::new(
                    router.address(),
                    FaultKind::Internal,
                    format!("router panicked: {}", panic_message(panic.as_ref())),
                    attempt,
                )
                .fatal();
                self.fail(original, descriptor).await;
                return;
            },
        };

        match dispatch {
            Dispatch::Advance(mut next) => {
                next.route = next.route.advanced();
                self.forward(next, original, attempt).await;
            },
            Dispatch::Divert(next) => self.forward(next, original, attempt).await,
            Dispatch::Terminate(next) => {
                let aggregation = self.settings.aggregation_address.clone();
                self.publish_to(&aggregation, next, original, attempt).await;
            },
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────────

    /// Publish `next` to the step under its cursor, or to aggregation once
    /// the route is exhausted. `original` is the envelope as received and is
    /// what the error handler sees if this hop cannot complete.
    async fn forward(&self, next: Envelope, original: Envelope, attempt: u32) {
        let target = next
            .route
            .next_address(&self.settings.aggregation_address)
            .to_string();
        if !self.book.contains(&target) {
            let violation = ProtocolViolation::UnknownAddress { address: target };
            self.violation(original, violation, attempt).await;
            return;
        }
        self.publish_to(&target, next, original, attempt).await;
    }

    async fn publish_to(&self, target: &str, next: Envelope, original: Envelope, attempt: u32) {
        let address = self.address();
        let bytes = match next.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                let descriptor =
                    FaultDescriptor::new(address, FaultKind::Internal, e.to_string(), attempt);
                self.fail(original, descriptor).await;
                return;
            },
        };

        match publish_with_retry(self.broker.as_ref(), target, bytes, &self.settings.publish).await {
            Ok(()) => {
                debug!(address, message_id = %next.message_id, next = target, "hop forwarded");
            },
            Err(e) => {
                warn!(address, message_id = %next.message_id, next = target, error = %e, "publish retries exhausted");
                let descriptor =
                    FaultDescriptor::new(address, FaultKind::Transport, e.to_string(), attempt);
                self.fail(original, descriptor).await;
            },
        }
    }

    async fn violation(&self, original: Envelope, violation: ProtocolViolation, attempt: u32) {
        let address = self.address();
        error!(address, message_id = %original.message_id, %violation, "protocol violation");
        counter!(mesh::PROTOCOL_VIOLATIONS_TOTAL, labels::ADDRESS => address.to_string())
            .increment(1);
        let descriptor = FaultDescriptor::new(
            address,
            FaultKind::ProtocolViolation,
            violation.to_string(),
            attempt,
        )
        .fatal();
        self.fail(original, descriptor).await;
    }

    /// Divert the unmodified envelope to its error handler with `fault`
    /// attached. The cursor is left on the failing step.
    async fn fail(&self, mut envelope: Envelope, fault: FaultDescriptor) {
        let address = self.address();
        warn!(
            address,
            message_id = %envelope.message_id,
            kind = %fault.kind,
            attempt = fault.attempt,
            retriable = fault.retriable,
            error = %fault.message,
            "hop faulted"
        );
        counter!(
            mesh::STAGE_FAULTS_TOTAL,
            labels::ADDRESS => address.to_string(),
            labels::KIND => fault.kind.as_str()
        )
        .increment(1);

        let handler = envelope
            .route
            .error_handler
            .clone()
            .unwrap_or_else(|| self.settings.aggregation_address.clone());
        if handler == address {
            error!(address, message_id = %envelope.message_id, "error handler cannot divert to itself, dropping message");
            return;
        }

        envelope.payload.error = Some(fault);
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(address, message_id = %envelope.message_id, error = %e, "failed to encode faulted envelope, dropping message");
                return;
            },
        };
        if let Err(e) =
            publish_with_retry(self.broker.as_ref(), &handler, bytes, &self.settings.publish).await
        {
            error!(
                address,
                message_id = %envelope.message_id,
                handler,
                error = %e,
                "could not reach error handler, dropping message"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
