//! Bridge from a waiting caller to the asynchronous mesh.
//!
//! [`CorrelationGateway::dispatch`] stamps a fresh envelope, registers a
//! correlation entry and publishes to the first pipeline step. The returned
//! [`PendingRequest`] resolves when the aggregation listener sees the terminal
//! envelope, or fails once the deadline passes. Dropping it before then
//! cancels the entry and tells the mesh to stop retrying.

use std::{sync::Arc, time::Duration};

use {
    bytes::Bytes,
    switchyard_broker::Broker,
    switchyard_common::time::elapsed_ms,
    switchyard_config::SwitchyardConfig,
    switchyard_metrics::{counter, gateway as gw_metrics, gauge, histogram, labels},
    switchyard_protocol::{
        ControlMessage, Envelope, EscalationState, GatewayResponse, Origin, Payload, Route,
        SubmitRequest, addresses,
    },
    switchyard_runtime::{PublishPolicy, publish_with_retry},
    switchyard_stages::ConversationLog,
    tokio::{sync::oneshot, task::JoinHandle, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    correlation::{CorrelationTable, Resolution},
    error::{Error, Result},
};

/// How often cancelled correlation entries are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub steps: Vec<String>,
    pub error_handler: String,
    pub aggregation_address: String,
    pub request_timeout: Duration,
    /// How long a cancelled entry keeps absorbing late deliveries.
    pub cancelled_ttl: Duration,
    pub publish: PublishPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from(&SwitchyardConfig::default())
    }
}

impl From<&SwitchyardConfig> for GatewaySettings {
    fn from(config: &SwitchyardConfig) -> Self {
        Self {
            steps: config.pipeline.steps.clone(),
            error_handler: config.pipeline.error_handler.clone(),
            aggregation_address: config.pipeline.aggregation_address.clone(),
            request_timeout: config.gateway.request_timeout(),
            cancelled_ttl: Duration::from_secs(config.escalation.cancellation_ttl_secs),
            publish: PublishPolicy {
                attempts: config.broker.publish_attempts.max(1),
                base: Duration::from_millis(config.broker.publish_backoff_ms),
                max: Duration::from_millis(config.broker.publish_backoff_max_ms),
            },
        }
    }
}

pub struct CorrelationGateway {
    broker: Arc<dyn Broker>,
    table: Arc<CorrelationTable>,
    conversation_log: Arc<dyn ConversationLog>,
    settings: GatewaySettings,
}

impl CorrelationGateway {
    pub fn new(
        broker: Arc<dyn Broker>,
        conversation_log: Arc<dyn ConversationLog>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            table: Arc::new(CorrelationTable::new(settings.cancelled_ttl)),
            broker,
            conversation_log,
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.table.pending()
    }

    /// Subscribe to the aggregation address and resolve entries until
    /// `token` fires. The subscription is open when this returns.
    pub async fn start(self: &Arc<Self>, token: CancellationToken) -> Result<JoinHandle<()>> {
        let mut subscription = self
            .broker
            .subscribe(&self.settings.aggregation_address)
            .await?;
        let gateway = Arc::clone(self);
        Ok(tokio::spawn(async move {
            info!(
                address = %gateway.settings.aggregation_address,
                "aggregation listener started"
            );
            let mut purge = tokio::time::interval(PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = purge.tick() => {
                        let purged = gateway.table.purge_cancelled();
                        if purged > 0 {
                            debug!(purged, "purged cancelled correlations");
                        }
                    },
                    next = subscription.recv() => match next {
                        Some(bytes) => gateway.on_terminal(bytes).await,
                        None => break,
                    },
                }
            }
            info!("aggregation listener stopped");
        }))
    }

    async fn on_terminal(&self, bytes: Bytes) {
        let mut envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed terminal envelope");
                return;
            },
        };
        settle_escalation_state(&mut envelope);
        debug!(
            message_id = %envelope.message_id,
            mesh_ms = elapsed_ms(envelope.metadata.created_at),
            trace = ?envelope.metadata.trace_addresses(),
            "terminal envelope received"
        );

        // Record the exchange before waking the caller, so the next turn of
        // the session sees it.
        if self.table.is_pending(&envelope.message_id) {
            self.record_turns(&envelope).await;
        }

        let message_id = envelope.message_id.clone();
        let resolution = self.table.resolve(envelope);
        gauge!(gw_metrics::PENDING).set(self.table.pending() as f64);
        if resolution != Resolution::Delivered {
            // Late, duplicate or cancelled: not a processing failure.
            debug!(%message_id, resolution = resolution.as_str(), "discarding terminal envelope");
            counter!(gw_metrics::DISCARDED_TOTAL, labels::REASON => resolution.as_str())
                .increment(1);
        }
    }

    async fn record_turns(&self, envelope: &Envelope) {
        let reply = GatewayResponse::from_envelope(envelope, 0).response_text;
        let session = &envelope.session_id;
        let turns = [
            format!("customer: {}", envelope.payload.customer_message),
            format!("agent: {reply}"),
        ];
        for turn in turns {
            if let Err(e) = self.conversation_log.append(session, turn).await {
                warn!(session_id = %session, error = %e, "failed to append conversation turn");
                break;
            }
        }
    }

    /// Submit and wait for the response.
    pub async fn submit(&self, request: SubmitRequest) -> Result<GatewayResponse> {
        self.dispatch(request, Origin::Http, None).await?.wait().await
    }

    /// Publish a new request into the mesh without waiting for it.
    ///
    /// `owner` ties the entry to a streaming connection so it can be
    /// cancelled when that connection closes.
    pub async fn dispatch(
        &self,
        request: SubmitRequest,
        origin: Origin,
        owner: Option<&str>,
    ) -> Result<PendingRequest> {
        if request.message.trim().is_empty() {
            return Err(Error::InvalidRequest("message must not be empty".into()));
        }
        let session_id = request
            .session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let route = Route::new(
            self.settings.steps.clone(),
            Some(self.settings.error_handler.clone()),
        );
        let first = route
            .current()
            .map(str::to_string)
            .ok_or_else(|| Error::message("pipeline has no steps"))?;
        let envelope = Envelope::new(
            route,
            Payload::new(request.message, request.customer_identity, &session_id),
            origin,
        );
        let message_id = envelope.message_id.clone();
        let bytes = envelope.encode()?;

        let started = Instant::now();
        let deadline = started + self.settings.request_timeout;
        let rx = self.table.register(&message_id, owner)?;
        let guard = CancelGuard {
            table: Arc::clone(&self.table),
            broker: Arc::clone(&self.broker),
            message_id: message_id.clone(),
            armed: true,
        };

        // Transport retries spend the same budget as the wait.
        let published = tokio::time::timeout_at(
            deadline,
            publish_with_retry(self.broker.as_ref(), &first, bytes, &self.settings.publish),
        )
        .await;
        match published {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                guard.disarm();
                self.table.remove(&message_id);
                warn!(%message_id, address = %first, error = %e, "failed to publish new request");
                return Err(e.into());
            },
            Err(_) => {
                guard.disarm();
                return Err(expire(
                    &self.table,
                    self.broker.as_ref(),
                    message_id,
                    session_id,
                    started,
                )
                .await);
            },
        }
        gauge!(gw_metrics::PENDING).set(self.table.pending() as f64);
        debug!(%message_id, %session_id, address = %first, "request dispatched");

        Ok(PendingRequest {
            message_id,
            session_id,
            started,
            deadline,
            rx,
            guard,
        })
    }

    /// Cancel one request and tell the mesh.
    pub async fn cancel(&self, message_id: &str) -> bool {
        if !self.table.cancel(message_id) {
            return false;
        }
        gauge!(gw_metrics::PENDING).set(self.table.pending() as f64);
        publish_cancel(self.broker.as_ref(), message_id).await;
        true
    }

    /// Cancel every request submitted over connection `owner`.
    pub async fn cancel_owned_by(&self, owner: &str) -> Vec<String> {
        let cancelled = self.table.cancel_owned_by(owner);
        for message_id in &cancelled {
            publish_cancel(self.broker.as_ref(), message_id).await;
        }
        if !cancelled.is_empty() {
            gauge!(gw_metrics::PENDING).set(self.table.pending() as f64);
            info!(conn_id = owner, count = cancelled.len(), "cancelled requests of closed connection");
        }
        cancelled
    }
}

/// An escalation state left mid-flight on a terminal envelope means a retry
/// went through the normal pipeline.
fn settle_escalation_state(envelope: &mut Envelope) {
    if envelope.payload.escalation.is_none()
        && matches!(
            envelope.metadata.escalation_state,
            Some(EscalationState::Received | EscalationState::Retrying)
        )
    {
        envelope.metadata.escalation_state = Some(EscalationState::Resolved);
    }
}

async fn publish_cancel(broker: &dyn Broker, message_id: &str) {
    let notice = ControlMessage::Cancel {
        message_id: message_id.to_string(),
    };
    let result = match notice.encode() {
        Ok(bytes) => broker
            .publish(addresses::CONTROL_CANCEL, bytes)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(error) = result {
        warn!(%message_id, %error, "failed to publish cancellation");
    }
}

/// Give up on a request whose deadline passed: drop its entry and tell the
/// mesh to stop working on it.
async fn expire(
    table: &CorrelationTable,
    broker: &dyn Broker,
    message_id: String,
    session_id: String,
    started: Instant,
) -> Error {
    let elapsed = started.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    table.remove(&message_id);
    gauge!(gw_metrics::PENDING).set(table.pending() as f64);
    publish_cancel(broker, &message_id).await;
    counter!(gw_metrics::REQUESTS_TOTAL, labels::STATUS => "timed_out").increment(1);
    histogram!(gw_metrics::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
    warn!(%message_id, elapsed_ms, "request timed out");
    Error::TimedOut {
        message_id,
        session_id,
        elapsed_ms,
    }
}

/// Cancels the correlation entry when the caller's future is dropped.
struct CancelGuard {
    table: Arc<CorrelationTable>,
    broker: Arc<dyn Broker>,
    message_id: String,
    armed: bool,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed || !self.table.cancel(&self.message_id) {
            return;
        }
        debug!(message_id = %self.message_id, "caller went away, request cancelled");
        gauge!(gw_metrics::PENDING).set(self.table.pending() as f64);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let broker = Arc::clone(&self.broker);
            let message_id = self.message_id.clone();
            handle.spawn(async move { publish_cancel(broker.as_ref(), &message_id).await });
        }
    }
}

/// A dispatched request awaiting its terminal envelope.
pub struct PendingRequest {
    message_id: String,
    session_id: String,
    started: Instant,
    deadline: Instant,
    rx: oneshot::Receiver<Envelope>,
    guard: CancelGuard,
}

impl PendingRequest {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the response until the request deadline.
    pub async fn wait(self) -> Result<GatewayResponse> {
        let Self {
            message_id,
            session_id,
            started,
            deadline,
            mut rx,
            guard,
        } = self;

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(envelope)) => {
                guard.disarm();
                let elapsed = started.elapsed();
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                let response = GatewayResponse::from_envelope(&envelope, elapsed_ms);
                let status = response.resolution_status.as_str();
                counter!(gw_metrics::REQUESTS_TOTAL, labels::STATUS => status).increment(1);
                histogram!(gw_metrics::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
                info!(
                    %message_id,
                    status,
                    retries = response.retry_count,
                    elapsed_ms,
                    "request resolved"
                );
                Ok(response)
            },
            Ok(Err(_)) => {
                // Cancelled elsewhere, e.g. its connection closed.
                guard.disarm();
                Err(Error::Cancelled { message_id })
            },
            Err(_) => {
                let table = Arc::clone(&guard.table);
                let broker = Arc::clone(&guard.broker);
                guard.disarm();
                Err(expire(&table, broker.as_ref(), message_id, session_id, started).await)
            },
        }
    }
}
