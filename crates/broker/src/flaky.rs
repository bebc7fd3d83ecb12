use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use {async_trait::async_trait, bytes::Bytes};

use crate::{Broker, BrokerError, Result, Subscription};

/// Wraps a broker and fails a fixed number of publishes before passing
/// through. Used to exercise transport retry paths.
pub struct FlakyBroker {
    inner: Arc<dyn Broker>,
    /// Only publishes to this address fail; `None` means every address.
    address: Option<String>,
    remaining_failures: AtomicU32,
    failed: AtomicU32,
}

impl FlakyBroker {
    pub fn new(inner: Arc<dyn Broker>, failures: u32) -> Self {
        Self {
            inner,
            address: None,
            remaining_failures: AtomicU32::new(failures),
            failed: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn only_for(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Publishes rejected so far.
    pub fn failures(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }

    fn should_fail(&self, address: &str) -> bool {
        if self.address.as_deref().is_some_and(|a| a != address) {
            return false;
        }
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn publish(&self, address: &str, payload: Bytes) -> Result<()> {
        if self.should_fail(address) {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(BrokerError::Unavailable {
                address: address.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.inner.publish(address, payload).await
    }

    async fn subscribe(&self, address: &str) -> Result<Subscription> {
        self.inner.subscribe(address).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::InMemoryBroker};

    #[tokio::test]
    async fn fails_then_passes_through() {
        let inner = Arc::new(InMemoryBroker::new());
        let flaky = FlakyBroker::new(inner, 2);
        let mut sub = flaky.subscribe("a").await.unwrap();

        assert!(flaky.publish("a", Bytes::from_static(b"1")).await.is_err());
        assert!(flaky.publish("a", Bytes::from_static(b"2")).await.is_err());
        flaky.publish("a", Bytes::from_static(b"3")).await.unwrap();

        assert_eq!(sub.recv().await.unwrap(), "3");
        assert_eq!(flaky.failures(), 2);
    }

    #[tokio::test]
    async fn scoped_failures_ignore_other_addresses() {
        let inner = Arc::new(InMemoryBroker::new());
        let flaky = FlakyBroker::new(inner, 1).only_for("b");
        flaky.publish("a", Bytes::new()).await.unwrap();
        assert!(flaky.publish("b", Bytes::new()).await.is_err());
        flaky.publish("b", Bytes::new()).await.unwrap();
    }
}
