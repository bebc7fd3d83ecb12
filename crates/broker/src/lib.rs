//! Publish/subscribe transport the mesh runs on.
//!
//! Addresses are plain strings. Delivery is at-least-once and unordered
//! across distinct messages; callers must not rely on anything stronger.

pub mod flaky;
pub mod memory;

use {async_trait::async_trait, bytes::Bytes, tokio::sync::mpsc};

pub use {flaky::FlakyBroker, memory::InMemoryBroker};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker is closed")]
    Closed,

    #[error("publish to '{address}' failed: {reason}")]
    Unavailable { address: String, reason: String },
}

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish one message. Returns once the broker has accepted it.
    async fn publish(&self, address: &str, payload: Bytes) -> Result<()>;

    /// Open a subscription on `address`.
    async fn subscribe(&self, address: &str) -> Result<Subscription>;
}

/// Stream of raw deliveries for one address.
#[derive(Debug)]
pub struct Subscription {
    address: String,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn new(address: impl Into<String>, rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            address: address.into(),
            rx,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next delivery, `None` once the broker has shut down.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
