use std::collections::BTreeMap;

use {
    bytes::Bytes,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{payload::Payload, route::Route, slots::EscalationState};

/// The routed unit of work: identity, route, payload and advisory metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Generated once at ingress; the sole correlation key.
    pub message_id: String,
    pub session_id: String,
    pub route: Route,
    pub payload: Payload,
    pub metadata: Metadata,
}

impl Envelope {
    /// Build a fresh envelope with a new `message_id`.
    pub fn new(route: Route, payload: Payload, origin: Origin) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: payload.session_id.clone(),
            route,
            payload,
            metadata: Metadata::new(origin),
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Short reference shown to customers in templated notices.
    pub fn reference_id(&self) -> &str {
        let end = self
            .message_id
            .char_indices()
            .nth(8)
            .map_or(self.message_id.len(), |(i, _)| i);
        &self.message_id[..end]
    }
}

/// Where the request entered the mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Http,
    Stream {
        conn_id: String,
    },
    Cli,
}

/// One processing hop, appended by the hop that produced payload content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopRecord {
    pub address: String,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

/// A route mutation applied by the decision router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecisionRecord {
    pub rule: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Advisory bookkeeping. Routing logic reads only `retry_counts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    /// Retries spent per step address.
    #[serde(default)]
    pub retry_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub trace: Vec<HopRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_state: Option<EscalationState>,
    #[serde(default)]
    pub route_decisions: Vec<RouteDecisionRecord>,
    #[serde(default)]
    pub origin: Origin,
}

impl Metadata {
    pub fn new(origin: Origin) -> Self {
        Self {
            created_at: Utc::now(),
            retry_counts: BTreeMap::new(),
            trace: Vec::new(),
            escalation_state: None,
            route_decisions: Vec::new(),
            origin,
        }
    }

    /// Total retries across every hop.
    pub fn retry_count(&self) -> u32 {
        self.retry_counts.values().sum()
    }

    pub fn retries_for(&self, address: &str) -> u32 {
        self.retry_counts.get(address).copied().unwrap_or(0)
    }

    /// Increment and return the retry counter for `address`.
    pub fn bump_retry(&mut self, address: &str) -> u32 {
        let count = self.retry_counts.entry(address.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_hop(&mut self, address: impl Into<String>, elapsed_ms: u64) {
        self.trace.push(HopRecord {
            address: address.into(),
            elapsed_ms,
            at: Utc::now(),
        });
    }

    pub fn trace_addresses(&self) -> Vec<String> {
        self.trace.iter().map(|h| h.address.clone()).collect()
    }
}

/// Out-of-band notices published on [`crate::addresses::CONTROL_CANCEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Cancel {
        #[serde(rename = "messageId")]
        message_id: String,
    },
}

impl ControlMessage {
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope::new(
            Route::new(crate::addresses::default_pipeline(), Some("escalation-router".into())),
            Payload::new("where is my order?", "cust-1", "sess-1"),
            Origin::Http,
        )
    }

    #[test]
    fn fresh_envelopes_get_distinct_ids() {
        let a = envelope();
        let b = envelope();
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(a.session_id, "sess-1");
        assert_eq!(a.reference_id().len(), 8);
    }

    #[test]
    fn wire_encoding_round_trips() {
        let mut env = envelope();
        env.metadata.bump_retry("context-stage");
        env.metadata.record_hop("classification-stage", 3);
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn retry_count_sums_hops() {
        let mut meta = Metadata::new(Origin::Cli);
        assert_eq!(meta.bump_retry("a"), 1);
        assert_eq!(meta.bump_retry("a"), 2);
        meta.bump_retry("b");
        assert_eq!(meta.retries_for("a"), 2);
        assert_eq!(meta.retry_count(), 3);
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        assert!(Envelope::decode(b"{not json").is_err());
    }

    #[test]
    fn control_cancel_wire_shape() {
        let msg = ControlMessage::Cancel {
            message_id: "m-1".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "cancel");
        assert_eq!(json["messageId"], "m-1");
    }
}
