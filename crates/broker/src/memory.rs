use std::sync::atomic::{AtomicBool, Ordering};

use {
    async_trait::async_trait,
    bytes::Bytes,
    dashmap::DashMap,
    tokio::sync::mpsc,
    tracing::{debug, trace},
};

use crate::{Broker, BrokerError, Result, Subscription};

const DEFAULT_CAPACITY: usize = 1_024;

/// In-process broker. Every subscriber of an address receives every message
/// published to it; publishing waits while a subscriber's buffer is full.
pub struct InMemoryBroker {
    subscribers: DashMap<String, Vec<mpsc::Sender<Bytes>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Per-subscriber buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Reject further publishes and end every subscription.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, address: &str) -> usize {
        self.subscribers
            .get(address)
            .map_or(0, |subs| subs.iter().filter(|s| !s.is_closed()).count())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, address: &str, payload: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        // Clone senders out so no shard lock is held across an await.
        let targets: Vec<mpsc::Sender<Bytes>> = self
            .subscribers
            .get(address)
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).cloned().collect())
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(address, "publish with no subscribers");
            return Ok(());
        }

        let mut delivered = 0usize;
        for tx in targets {
            if tx.send(payload.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        if delivered == 0 {
            self.subscribers.remove(address);
        }
        trace!(address, delivered, bytes = payload.len(), "published");
        Ok(())
    }

    async fn subscribe(&self, address: &str) -> Result<Subscription> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.entry(address.to_string()).or_default();
        subs.retain(|s| !s.is_closed());
        subs.push(tx);
        debug!(address, subscribers = subs.len(), "subscribed");
        Ok(Subscription::new(address, rx))
    }
}
