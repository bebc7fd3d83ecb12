use {
    bytes::Bytes,
    switchyard_broker::{Broker, BrokerError},
    switchyard_metrics::{counter, labels, mesh},
    tracing::warn,
};

use crate::settings::PublishPolicy;

/// Publish with bounded exponential backoff local to this hop.
///
/// Returns the last broker error once `policy.attempts` are exhausted.
pub async fn publish_with_retry(
    broker: &dyn Broker,
    address: &str,
    payload: Bytes,
    policy: &PublishPolicy,
) -> Result<(), BrokerError> {
    let attempts = policy.attempts.max(1);
    let mut failed = 0;
    loop {
        match broker.publish(address, payload.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                failed += 1;
                if failed >= attempts {
                    return Err(e);
                }
                let delay = policy.backoff(failed);
                warn!(
                    address,
                    attempt = failed,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "publish failed, retrying"
                );
                counter!(mesh::TRANSPORT_RETRIES_TOTAL, labels::ADDRESS => address.to_string())
                    .increment(1);
                tokio::time::sleep(delay).await;
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{sync::Arc, time::Duration},
        switchyard_broker::{FlakyBroker, InMemoryBroker},
    };

    fn policy(attempts: u32) -> PublishPolicy {
        PublishPolicy {
            attempts,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn recovers_within_ceiling() {
        let inner = Arc::new(InMemoryBroker::new());
        let mut sub = inner.subscribe("a").await.unwrap();
        let flaky = FlakyBroker::new(inner, 2);
        publish_with_retry(&flaky, "a", Bytes::from_static(b"m"), &policy(3))
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap(), "m");
        assert_eq!(flaky.failures(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_ceiling() {
        let flaky = FlakyBroker::new(Arc::new(InMemoryBroker::new()), 10);
        let err = publish_with_retry(&flaky, "a", Bytes::new(), &policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
        assert_eq!(flaky.failures(), 3);
    }
}
