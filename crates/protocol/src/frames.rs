//! JSON frames exchanged with streaming clients over `/ws`.
//!
//! - [`RequestFrame`]: client → gateway call (`submit`, `ping`)
//! - [`ResponseFrame`]: gateway → client acknowledgement or error
//! - [`EventFrame`]: gateway → client push (`connected`, `chat.response`, `error`)

use serde::{Deserialize, Serialize};

pub mod methods {
    pub const SUBMIT: &str = "submit";
    pub const PING: &str = "ping";
}

pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const CHAT_RESPONSE: &str = "chat.response";
    pub const ERROR: &str = "error";
}

pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const FRAME_TOO_LARGE: &str = "FRAME_TOO_LARGE";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const TIMED_OUT: &str = "TIMED_OUT";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
        }
    }

    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → gateway request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            r#type: "req".into(),
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// Parameters of a `submit` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitParams {
    pub message: String,
    #[serde(default)]
    pub customer_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Gateway → client response to a single request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Gateway → client server push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }
}

/// Any frame, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayFrame {
    #[serde(rename = "req")]
    Request {
        id: String,
        method: String,
        #[serde(default)]
        params: Option<serde_json::Value>,
    },
    #[serde(rename = "res")]
    Response {
        id: String,
        ok: bool,
        #[serde(default)]
        payload: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<ErrorShape>,
    },
    #[serde(rename = "event")]
    Event {
        event: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
        #[serde(default)]
        seq: Option<u64>,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_parses_as_gateway_frame() {
        let raw = r#"{"type":"req","id":"1","method":"submit","params":{"message":"hi"}}"#;
        let frame: GatewayFrame = serde_json::from_str(raw).unwrap();
        match frame {
            GatewayFrame::Request { id, method, params } => {
                assert_eq!(id, "1");
                assert_eq!(method, methods::SUBMIT);
                let p: SubmitParams = serde_json::from_value(params.unwrap()).unwrap();
                assert_eq!(p.message, "hi");
                assert!(p.customer_identity.is_empty());
                assert!(p.session_id.is_none());
            },
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn error_response_omits_payload() {
        let frame = ResponseFrame::err("7", ErrorShape::new(error_codes::TIMED_OUT, "late"));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "res");
        assert_eq!(json["ok"], false);
        assert!(json.get("payload").is_none());
        assert_eq!(json["error"]["code"], "TIMED_OUT");
    }

    #[test]
    fn event_frame_round_trips_through_tagged_enum() {
        let frame = EventFrame::new(events::CHAT_RESPONSE, serde_json::json!({"x": 1}), 4);
        let text = serde_json::to_string(&frame).unwrap();
        let parsed: GatewayFrame = serde_json::from_str(&text).unwrap();
        assert!(matches!(parsed, GatewayFrame::Event { seq: Some(4), .. }));
    }
}
