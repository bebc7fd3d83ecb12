//! Side-effecting actions derived from the classified intent.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    switchyard_protocol::{
        ActionResult, Entities, ExecutionReport, Payload, PayloadPatch, StageKind, addresses,
    },
    switchyard_runtime::{Stage, StageFault},
    tracing::{debug, info},
};

use crate::{entities::EntityStage, error::CollaboratorError};

pub const MAX_ACTIONS_PER_MESSAGE: usize = 5;

/// Backend that carries out named actions.
///
/// Implementations must be idempotent per `(action, target)`: the mesh
/// delivers at least once, so the same action may arrive twice.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &str,
        target: Option<&str>,
        customer_identity: &str,
    ) -> Result<ActionResult, CollaboratorError>;
}

/// Actions for an intent, in execution order.
pub fn plan_for(intent: &str) -> &'static [&'static str] {
    match intent {
        "order_inquiry" => &["check_order_status", "provide_tracking_info"],
        "delivery_issue" => &["provide_tracking_info", "contact_carrier"],
        "product_complaint" => &["add_customer_note", "add_order_note"],
        "return_request" => &["generate_return_label", "process_return"],
        "cancellation_request" => &["cancel_order"],
        "billing_question" => &["add_customer_note"],
        "escalation_request" => &["escalate_to_supervisor"],
        _ => &["add_customer_note"],
    }
}

fn target_for(action: &str, entities: &Entities) -> Option<String> {
    let tracking = matches!(action, "provide_tracking_info" | "contact_carrier");
    let tracked = entities.tracking_numbers.first();
    let ordered = entities.order_numbers.first();
    let chosen = if tracking { tracked.or(ordered) } else { ordered };
    chosen.cloned()
}

pub struct ExecutionStage {
    executor: Arc<dyn ActionExecutor>,
    /// Used when the action step runs before the entity stage has.
    fallback_extractor: EntityStage,
}

impl ExecutionStage {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Result<Self, regex::Error> {
        Ok(Self {
            executor,
            fallback_extractor: EntityStage::new()?,
        })
    }
}

#[async_trait]
impl Stage for ExecutionStage {
    fn address(&self) -> &str {
        addresses::EXECUTION
    }

    fn kind(&self) -> StageKind {
        StageKind::Execution
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        let intent = payload
            .classification
            .as_ref()
            .map(|c| c.intent.as_str())
            .unwrap_or_default();

        let entities = match &payload.entities {
            Some(entities) => entities.clone(),
            None => self.fallback_extractor.extract(&payload.customer_message),
        };

        let mut report = ExecutionReport::default();
        for action in plan_for(intent).iter().take(MAX_ACTIONS_PER_MESSAGE) {
            let target = target_for(action, &entities);
            let result = self
                .executor
                .execute(action, target.as_deref(), &payload.customer_identity)
                .await
                .map_err(|e| StageFault::dependency(format!("{action}: {e}")))?;
            debug!(action, succeeded = result.succeeded, "action executed");
            report.actions.push(result);
        }
        Ok(PayloadPatch::execution(report))
    }
}

// ── Simulated backend ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderState {
    Open,
    Cancelled,
    ReturnStarted,
}

/// In-memory stand-in for the order, tracking and notes services.
pub struct SimulatedBackend {
    orders: DashMap<String, OrderState>,
    tracking: DashMap<String, String>,
    order_tracking: DashMap<String, String>,
    notes: DashMap<String, Vec<String>>,
    failures: AtomicU32,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self {
            orders: DashMap::new(),
            tracking: DashMap::new(),
            order_tracking: DashMap::new(),
            notes: DashMap::new(),
            failures: AtomicU32::new(0),
        }
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders and shipments matching the demo customer store.
    pub fn with_demo_data() -> Self {
        let backend = Self::new();
        for (order, tracking, status) in [
            ("ORD-12345678", "TRK123456789", "delivered"),
            ("ORD-87654321", "TRK987654321", "out for delivery"),
            ("ORD-55566677", "TRK555666777", "in transit"),
        ] {
            backend.orders.insert(order.into(), OrderState::Open);
            backend.tracking.insert(tracking.into(), status.into());
            backend.order_tracking.insert(order.into(), tracking.into());
        }
        backend
    }

    /// Makes the next `n` calls fail as if the backend were down.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn notes_for(&self, customer_identity: &str) -> Vec<String> {
        self.notes
            .get(customer_identity)
            .map(|n| n.value().clone())
            .unwrap_or_default()
    }

    fn ok(action: &str, target: Option<&str>, detail: impl Into<String>) -> ActionResult {
        ActionResult {
            action: action.to_string(),
            target: target.map(String::from),
            succeeded: true,
            detail: detail.into(),
        }
    }

    fn refused(action: &str, target: Option<&str>, detail: impl Into<String>) -> ActionResult {
        ActionResult {
            succeeded: false,
            ..Self::ok(action, target, detail)
        }
    }

    fn add_note(&self, customer_identity: &str, note: String) {
        let mut notes = self
            .notes
            .entry(customer_identity.to_string())
            .or_default();
        if !notes.contains(&note) {
            notes.push(note);
        }
    }
}

#[async_trait]
impl ActionExecutor for SimulatedBackend {
    async fn execute(
        &self,
        action: &str,
        target: Option<&str>,
        customer_identity: &str,
    ) -> Result<ActionResult, CollaboratorError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CollaboratorError::Unavailable {
                service: "order service",
                reason: "503 service unavailable".into(),
            });
        }

        let result = match (action, target) {
            ("provide_tracking_info" | "contact_carrier", Some(t)) if t.starts_with("TRK") => {
                match self.tracking.get(t) {
                    Some(status) => Self::ok(action, target, format!("shipment is {}", *status)),
                    None => Self::refused(action, target, "unknown tracking number"),
                }
            },
            (
                "check_order_status"
                | "provide_tracking_info"
                | "contact_carrier"
                | "add_order_note"
                | "generate_return_label"
                | "process_return"
                | "cancel_order",
                None,
            ) => Self::refused(action, target, "no order reference given"),
            (_, Some(order)) if !self.orders.contains_key(order) && action != "add_customer_note" => {
                Self::refused(action, target, "order not found")
            },
            ("provide_tracking_info" | "contact_carrier", Some(order)) => {
                let tracking = self.order_tracking.get(order).map(|t| t.value().clone());
                let status = tracking
                    .as_deref()
                    .and_then(|t| self.tracking.get(t).map(|s| s.value().clone()));
                match (tracking, status) {
                    (Some(trk), Some(status)) => {
                        Self::ok(action, target, format!("shipment {trk} is {status}"))
                    },
                    _ => Self::refused(action, target, "order has not shipped"),
                }
            },
            ("cancel_order", Some(order)) => {
                let mut state = self
                    .orders
                    .entry(order.to_string())
                    .or_insert(OrderState::Open);
                let current = *state;
                match current {
                    OrderState::Open => {
                        *state = OrderState::Cancelled;
                        info!(order, "order cancelled");
                        Self::ok(action, target, "order cancelled")
                    },
                    OrderState::Cancelled => Self::ok(action, target, "order already cancelled"),
                    OrderState::ReturnStarted => {
                        Self::refused(action, target, "a return is already in progress")
                    },
                }
            },
            ("process_return" | "generate_return_label", Some(order)) => {
                let mut state = self
                    .orders
                    .entry(order.to_string())
                    .or_insert(OrderState::Open);
                let current = *state;
                match current {
                    OrderState::Cancelled => {
                        Self::refused(action, target, "order was cancelled")
                    },
                    _ => {
                        *state = OrderState::ReturnStarted;
                        let detail = if action == "generate_return_label" {
                            format!("return label RL-{order} issued")
                        } else {
                            "return registered".to_string()
                        };
                        Self::ok(action, target, detail)
                    },
                }
            },
            ("check_order_status", Some(order)) => {
                let state = self.orders.get(order).map(|s| *s.value());
                let detail = match state {
                    Some(OrderState::Cancelled) => "order is cancelled",
                    Some(OrderState::ReturnStarted) => "return in progress",
                    _ => "order is active",
                };
                Self::ok(action, target, detail)
            },
            ("add_customer_note" | "add_order_note" | "escalate_to_supervisor", _) => {
                let subject = target.unwrap_or("account");
                self.add_note(customer_identity, format!("{action}: {subject}"));
                Self::ok(action, target, "note recorded")
            },
            _ => Self::refused(action, target, "action not supported"),
        };
        Ok(result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::classification::ClassificationStage,
        switchyard_protocol::FaultKind,
    };

    #[tokio::test]
    async fn entities_are_extracted_when_the_slot_is_empty() {
        let stage = ExecutionStage::new(Arc::new(SimulatedBackend::with_demo_data())).unwrap();
        let mut p = payload("Please cancel ORD-87654321");
        p.entities = None;
        let report = stage.process(&p).await.unwrap().execution.unwrap();
        assert_eq!(report.actions[0].target.as_deref(), Some("ORD-87654321"));
        assert!(report.actions[0].succeeded);
    }

    fn payload(text: &str) -> Payload {
        let mut p = Payload::new(text, "bob.wilson@example.com", "s1");
        p.classification = Some(ClassificationStage::new().unwrap().classify(text));
        p.entities = Some(EntityStage::new().unwrap().extract(text));
        p
    }

    #[test]
    fn plans_follow_intent() {
        assert_eq!(plan_for("cancellation_request"), &["cancel_order"]);
        assert_eq!(plan_for("return_request"), &[
            "generate_return_label",
            "process_return"
        ]);
        assert_eq!(plan_for("something_else"), &["add_customer_note"]);
    }

    #[tokio::test]
    async fn cancellation_is_idempotent() {
        let backend = Arc::new(SimulatedBackend::with_demo_data());
        let stage = ExecutionStage::new(backend.clone()).unwrap();
        let p = payload("Please cancel ORD-55566677");

        let first = stage.process(&p).await.unwrap().execution.unwrap();
        assert_eq!(first.actions.len(), 1);
        assert!(first.actions[0].succeeded);
        assert_eq!(first.actions[0].target.as_deref(), Some("ORD-55566677"));
        assert_eq!(first.actions[0].detail, "order cancelled");

        let again = stage.process(&p).await.unwrap().execution.unwrap();
        assert!(again.actions[0].succeeded);
        assert_eq!(again.actions[0].detail, "order already cancelled");
    }

    #[tokio::test]
    async fn return_issues_label_then_registers() {
        let stage = ExecutionStage::new(Arc::new(SimulatedBackend::with_demo_data())).unwrap();
        let report = stage
            .process(&payload("I want to return ORD-12345678"))
            .await
            .unwrap()
            .execution
            .unwrap();
        let details: Vec<_> = report.actions.iter().map(|a| a.detail.as_str()).collect();
        assert_eq!(details, vec![
            "return label RL-ORD-12345678 issued",
            "return registered"
        ]);
    }

    #[tokio::test]
    async fn unknown_or_missing_order_is_refused_not_faulted() {
        let stage = ExecutionStage::new(Arc::new(SimulatedBackend::with_demo_data())).unwrap();
        let report = stage
            .process(&payload("Please cancel ORD-99999999"))
            .await
            .unwrap()
            .execution
            .unwrap();
        assert!(!report.actions[0].succeeded);
        assert_eq!(report.actions[0].detail, "order not found");

        let report = stage
            .process(&payload("Please cancel it"))
            .await
            .unwrap()
            .execution
            .unwrap();
        assert_eq!(report.actions[0].detail, "no order reference given");
    }

    #[tokio::test]
    async fn tracking_actions_prefer_tracking_numbers() {
        let stage = ExecutionStage::new(Arc::new(SimulatedBackend::with_demo_data())).unwrap();
        let report = stage
            .process(&payload("Where is my order? Tracking TRK987654321"))
            .await
            .unwrap()
            .execution
            .unwrap();
        let tracking = &report.actions[1];
        assert_eq!(tracking.action, "provide_tracking_info");
        assert_eq!(tracking.detail, "shipment is out for delivery");
    }

    #[tokio::test]
    async fn backend_outage_is_a_dependency_fault() {
        let backend = Arc::new(SimulatedBackend::with_demo_data());
        backend.fail_next(1);
        let stage = ExecutionStage::new(backend.clone()).unwrap();

        let fault = stage
            .process(&payload("Please cancel ORD-55566677"))
            .await
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Dependency);
        assert!(fault.message.starts_with("cancel_order:"));

        assert!(stage.process(&payload("Please cancel ORD-55566677")).await.is_ok());
    }

    #[tokio::test]
    async fn notes_are_recorded_once() {
        let backend = Arc::new(SimulatedBackend::new());
        let stage = ExecutionStage::new(backend.clone()).unwrap();
        let p = payload("I have a question about my bill");
        stage.process(&p).await.unwrap();
        stage.process(&p).await.unwrap();
        assert_eq!(backend.notes_for("bob.wilson@example.com"), vec![
            "add_customer_note: account"
        ]);
    }
}
