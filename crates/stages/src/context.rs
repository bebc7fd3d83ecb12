//! Customer context retrieval and the collaborators behind it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    switchyard_protocol::{
        CustomerContext, CustomerProfile, CustomerTier, OrderSummary, Payload, PayloadPatch,
        StageKind, addresses,
    },
    switchyard_runtime::{Stage, StageFault},
    tracing::debug,
};

use crate::error::CollaboratorError;

/// Key-value lookup of customer records keyed by customer identity.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn profile(&self, identity: &str) -> Result<Option<CustomerProfile>, CollaboratorError>;

    async fn orders(&self, customer_id: &str) -> Result<Vec<OrderSummary>, CollaboratorError>;
}

/// Append-only conversation log keyed by session id.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Up to `limit` most recent turns, oldest first.
    async fn recent(&self, session_id: &str, limit: usize)
    -> Result<Vec<String>, CollaboratorError>;

    async fn append(&self, session_id: &str, turn: String) -> Result<(), CollaboratorError>;
}

// ── Stage ────────────────────────────────────────────────────────────────────

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RECENT_TURNS: usize = 6;

pub struct ContextStage {
    store: Arc<dyn ContextStore>,
    log: Arc<dyn ConversationLog>,
    call_timeout: Duration,
    recent_turns: usize,
}

impl ContextStage {
    pub fn new(store: Arc<dyn ContextStore>, log: Arc<dyn ConversationLog>) -> Self {
        Self {
            store,
            log,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            recent_turns: DEFAULT_RECENT_TURNS,
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_recent_turns(mut self, limit: usize) -> Self {
        self.recent_turns = limit;
        self
    }

    async fn call<T, F>(&self, service: &'static str, fut: F) -> Result<T, StageFault>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StageFault::dependency(e.to_string())),
            Err(_) => Err(StageFault::dependency(
                CollaboratorError::Timeout {
                    service,
                    timeout_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .to_string(),
            )),
        }
    }
}

#[async_trait]
impl Stage for ContextStage {
    fn address(&self) -> &str {
        addresses::CONTEXT
    }

    fn kind(&self) -> StageKind {
        StageKind::Context
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        let profile = self
            .call("customer store", self.store.profile(&payload.customer_identity))
            .await?;
        let orders = match &profile {
            Some(p) => self.call("customer store", self.store.orders(&p.customer_id)).await?,
            None => Vec::new(),
        };
        let recent_turns = self
            .call(
                "conversation log",
                self.log.recent(&payload.session_id, self.recent_turns),
            )
            .await?;

        debug!(
            known_customer = profile.is_some(),
            orders = orders.len(),
            turns = recent_turns.len(),
            "context retrieved"
        );
        Ok(PayloadPatch::context(CustomerContext {
            profile,
            orders,
            recent_turns,
        }))
    }
}

// ── In-memory collaborators ──────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryContextStore {
    profiles: DashMap<String, CustomerProfile>,
    orders: DashMap<String, Vec<OrderSummary>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three sample customers, one per tier, each with a tracked order.
    pub fn with_demo_data() -> Self {
        let store = Self::new();
        let customers = [
            (
                "cust-john",
                "John Doe",
                "john.doe@example.com",
                CustomerTier::Premium,
                12,
                ("ORD-12345678", "delivered", "TRK123456789"),
            ),
            (
                "cust-jane",
                "Jane Smith",
                "jane.smith@example.com",
                CustomerTier::Vip,
                48,
                ("ORD-87654321", "out_for_delivery", "TRK987654321"),
            ),
            (
                "cust-bob",
                "Bob Wilson",
                "bob.wilson@example.com",
                CustomerTier::Standard,
                3,
                ("ORD-55566677", "in_transit", "TRK555666777"),
            ),
        ];
        for (id, name, email, tier, lifetime_orders, (order_id, status, tracking)) in customers {
            store.insert_profile(CustomerProfile {
                customer_id: id.into(),
                name: Some(name.into()),
                email: Some(email.into()),
                tier,
                lifetime_orders,
            });
            store.insert_order(id, OrderSummary {
                order_id: order_id.into(),
                status: status.into(),
                tracking_number: Some(tracking.into()),
            });
        }
        store
    }

    /// Indexed by email when the profile has one, else by customer id.
    pub fn insert_profile(&self, profile: CustomerProfile) {
        let key = profile
            .email
            .clone()
            .unwrap_or_else(|| profile.customer_id.clone());
        self.profiles.insert(key.to_lowercase(), profile);
    }

    pub fn insert_order(&self, customer_id: &str, order: OrderSummary) {
        self.orders
            .entry(customer_id.to_string())
            .or_default()
            .push(order);
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn profile(&self, identity: &str) -> Result<Option<CustomerProfile>, CollaboratorError> {
        Ok(self
            .profiles
            .get(&identity.to_lowercase())
            .map(|p| p.value().clone()))
    }

    async fn orders(&self, customer_id: &str) -> Result<Vec<OrderSummary>, CollaboratorError> {
        Ok(self
            .orders
            .get(customer_id)
            .map(|o| o.value().clone())
            .unwrap_or_default())
    }
}

/// Wraps a store and fails the first `failures` profile lookups.
pub struct FlakyContextStore {
    inner: Arc<dyn ContextStore>,
    failures: AtomicU32,
}

impl FlakyContextStore {
    pub fn new(inner: Arc<dyn ContextStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }

    /// Failures still to be injected.
    pub fn remaining_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextStore for FlakyContextStore {
    async fn profile(&self, identity: &str) -> Result<Option<CustomerProfile>, CollaboratorError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CollaboratorError::Unavailable {
                service: "customer store",
                reason: "connection refused".into(),
            });
        }
        self.inner.profile(identity).await
    }

    async fn orders(&self, customer_id: &str) -> Result<Vec<OrderSummary>, CollaboratorError> {
        self.inner.orders(customer_id).await
    }
}

#[derive(Default)]
pub struct InMemoryConversationLog {
    sessions: DashMap<String, Vec<String>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, CollaboratorError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|turns| {
                let start = turns.len().saturating_sub(limit);
                turns[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turn: String) -> Result<(), CollaboratorError> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(turn);
        Ok(())
    }
}
