//! Tracking of requests whose caller has gone away.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    switchyard_broker::{Broker, BrokerError},
    switchyard_protocol::{ControlMessage, addresses},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::ttl_cache::TtlCache;

const MAX_TRACKED: usize = 10_000;

/// Message ids cancelled by the gateway, remembered for a bounded time.
pub struct Cancellations {
    ids: Mutex<TtlCache<()>>,
}

impl Cancellations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ids: Mutex::new(TtlCache::new(ttl, MAX_TRACKED)),
        }
    }

    pub fn cancel(&self, message_id: &str) {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.insert(message_id, ());
    }

    pub fn is_cancelled(&self, message_id: &str) -> bool {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.contains(message_id)
    }
}

/// Subscribe to cancellation notices and record them until `token` fires.
///
/// The subscription is in place when this returns, so no notice published
/// afterwards is missed.
pub async fn listen_for_cancellations(
    broker: Arc<dyn Broker>,
    cancellations: Arc<Cancellations>,
    token: CancellationToken,
) -> Result<JoinHandle<()>, BrokerError> {
    let mut subscription = broker.subscribe(addresses::CONTROL_CANCEL).await?;
    Ok(tokio::spawn(async move {
        info!(address = addresses::CONTROL_CANCEL, "cancellation listener started");
        loop {
            let bytes = tokio::select! {
                _ = token.cancelled() => break,
                next = subscription.recv() => match next {
                    Some(bytes) => bytes,
                    None => break,
                },
            };
            match ControlMessage::decode(&bytes) {
                Ok(ControlMessage::Cancel { message_id }) => {
                    debug!(%message_id, "request cancelled by caller");
                    cancellations.cancel(&message_id);
                },
                Err(e) => warn!(error = %e, "dropping malformed control message"),
            }
        }
        info!(address = addresses::CONTROL_CANCEL, "cancellation listener stopped");
    }))
}
