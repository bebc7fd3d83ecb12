//! Live streaming connections and the requests each one awaits.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    switchyard_config::GatewayConfig,
    switchyard_metrics::{counter, gateway as gw_metrics, gauge},
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::gateway::CorrelationGateway;

/// What the write half of a connection should send next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Heartbeat probe.
    Ping,
    Close,
}

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    /// Consecutive unanswered probes before the connection is dropped.
    pub max_missed: u32,
}

impl From<&GatewayConfig> for HeartbeatSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            max_missed: config.heartbeat_max_missed.max(1),
        }
    }
}

struct Connection {
    sender: mpsc::UnboundedSender<Outbound>,
    awaiting: HashSet<String>,
    missed: u32,
    connected_at: Instant,
    /// Fired on unregister so the read loop stops taking frames.
    closed: CancellationToken,
}

pub struct ConnectionRegistry {
    connections: DashMap<String, Connection>,
    gateway: Arc<CorrelationGateway>,
    heartbeat: HeartbeatSettings,
    seq: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(gateway: Arc<CorrelationGateway>, heartbeat: HeartbeatSettings) -> Self {
        Self {
            connections: DashMap::new(),
            gateway,
            heartbeat,
            seq: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Arc<CorrelationGateway> {
        &self.gateway
    }

    pub fn heartbeat(&self) -> HeartbeatSettings {
        self.heartbeat
    }

    /// Sequence number for the next event frame.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns a token that fires once the connection is unregistered, from
    /// either side.
    pub fn register(
        &self,
        conn_id: &str,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> CancellationToken {
        let closed = CancellationToken::new();
        self.connections.insert(conn_id.to_string(), Connection {
            sender,
            awaiting: HashSet::new(),
            missed: 0,
            connected_at: Instant::now(),
            closed: closed.clone(),
        });
        gauge!(gw_metrics::WS_CONNECTIONS_ACTIVE).increment(1.0);
        closed
    }

    /// Forget the connection and cancel everything it was waiting for.
    /// Returns how long it was connected, or `None` if it was unknown.
    pub async fn unregister(&self, conn_id: &str) -> Option<Duration> {
        let (_, connection) = self.connections.remove(conn_id)?;
        connection.closed.cancel();
        gauge!(gw_metrics::WS_CONNECTIONS_ACTIVE).decrement(1.0);
        // In-flight processing runs to completion; its result is discarded.
        self.gateway.cancel_owned_by(conn_id).await;
        Some(connection.connected_at.elapsed())
    }

    /// Note that `conn_id` awaits `message_id`.
    pub fn track(&self, conn_id: &str, message_id: &str) -> bool {
        let Some(mut connection) = self.connections.get_mut(conn_id) else {
            return false;
        };
        connection.awaiting.insert(message_id.to_string());
        true
    }

    /// Push the resolved frame for `message_id` onto its connection.
    pub fn deliver(&self, conn_id: &str, message_id: &str, frame: String) -> bool {
        let Some(mut connection) = self.connections.get_mut(conn_id) else {
            debug!(conn_id, message_id, "connection gone, dropping response");
            return false;
        };
        connection.awaiting.remove(message_id);
        connection.sender.send(Outbound::Text(frame)).is_ok()
    }

    /// Requests `conn_id` is still waiting on.
    pub fn awaiting(&self, conn_id: &str) -> usize {
        self.connections
            .get(conn_id)
            .map_or(0, |c| c.awaiting.len())
    }

    pub fn record_pong(&self, conn_id: &str) {
        if let Some(mut connection) = self.connections.get_mut(conn_id) {
            connection.missed = 0;
        }
    }

    /// One heartbeat tick: probe every connection and drop the ones that
    /// stopped answering. Returns the dropped connection ids.
    pub async fn probe_all(&self) -> Vec<String> {
        let max_missed = self.heartbeat.max_missed;
        let mut dead = Vec::new();
        for mut entry in self.connections.iter_mut() {
            if entry.missed >= max_missed {
                dead.push(entry.key().clone());
                continue;
            }
            entry.missed += 1;
            if entry.sender.send(Outbound::Ping).is_err() {
                dead.push(entry.key().clone());
            }
        }

        for conn_id in &dead {
            if let Some(connection) = self.connections.get(conn_id) {
                let _ = connection.sender.send(Outbound::Close);
            }
            warn!(conn_id = %conn_id, max_missed, "heartbeat missed, closing connection");
            counter!(gw_metrics::WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            self.unregister(conn_id).await;
        }
        dead
    }

    /// Probe connections every heartbeat interval until `token` fires.
    pub fn spawn_heartbeat(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.heartbeat.interval);
            interval.tick().await;
            info!(
                interval_ms = registry.heartbeat.interval.as_millis() as u64,
                "heartbeat started"
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        registry.probe_all().await;
                    },
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::gateway::GatewaySettings,
        switchyard_broker::InMemoryBroker,
        switchyard_protocol::{Origin, SubmitRequest},
        switchyard_stages::InMemoryConversationLog,
    };

    fn registry(max_missed: u32) -> Arc<ConnectionRegistry> {
        let gateway = Arc::new(CorrelationGateway::new(
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryConversationLog::new()),
            GatewaySettings::default(),
        ));
        Arc::new(ConnectionRegistry::new(gateway, HeartbeatSettings {
            interval: Duration::from_millis(100),
            max_missed,
        }))
    }

    #[test]
    fn deliver_routes_to_the_owning_connection() {
        let registry = registry(3);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("a", tx_a);
        registry.register("b", tx_b);

        assert!(registry.track("a", "m-1"));
        assert!(registry.track("a", "m-2"));
        assert!(!registry.track("zzz", "m-3"));
        assert_eq!(registry.awaiting("a"), 2);

        // Out of order relative to submission.
        assert!(registry.deliver("a", "m-2", "second".into()));
        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Text("second".into()));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(registry.awaiting("a"), 1);
        assert!(!registry.deliver("zzz", "m-1", "x".into()));
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_after_max_missed() {
        let registry = registry(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let closed = registry.register("a", tx);

        assert!(registry.probe_all().await.is_empty());
        assert!(registry.probe_all().await.is_empty());
        assert!(!closed.is_cancelled());
        assert_eq!(registry.probe_all().await, vec!["a".to_string()]);
        assert!(registry.is_empty());
        assert!(closed.is_cancelled());
        assert!(!registry.track("a", "m-1"));

        assert_eq!(rx.recv().await, Some(Outbound::Ping));
        assert_eq!(rx.recv().await, Some(Outbound::Ping));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn pong_resets_the_missed_count() {
        let registry = registry(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("a", tx);
        for _ in 0..5 {
            assert!(registry.probe_all().await.is_empty());
            registry.record_pong("a");
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unregister_cancels_owned_requests() {
        let registry = registry(3);
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("a", tx);

        let pending = registry
            .gateway()
            .dispatch(
                SubmitRequest {
                    message: "hello".into(),
                    customer_identity: "c".into(),
                    session_id: None,
                },
                Origin::Stream {
                    conn_id: "a".into(),
                },
                Some("a"),
            )
            .await
            .unwrap();
        registry.track("a", pending.message_id());
        assert_eq!(registry.gateway().pending(), 1);

        assert!(registry.unregister("a").await.is_some());
        assert!(registry.unregister("a").await.is_none());
        assert_eq!(registry.gateway().pending(), 0);
        assert!(pending.wait().await.is_err());
    }
}
