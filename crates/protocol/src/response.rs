use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Text returned when a terminal envelope carries neither a draft nor an
/// escalation notice.
pub const GENERIC_FALLBACK_TEXT: &str = "We're sorry, we couldn't complete your request \
                                         right now. A member of our support team will follow \
                                         up with you shortly.";

/// Text returned when the caller's deadline passes first.
pub const TIMED_OUT_TEXT: &str = "We're sorry, your request is taking longer than expected. \
                                  Please try again in a moment.";

/// Caller-facing request accepted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(alias = "customer_message")]
    pub message: String,
    #[serde(default, alias = "customer_identity")]
    pub customer_identity: String,
    #[serde(default, alias = "session_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Escalated,
    TimedOut,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub message_id: String,
    pub session_id: String,
    pub response_text: String,
    pub resolution_status: ResolutionStatus,
    /// Stage names visited, in order.
    pub trace: Vec<String>,
    pub retry_count: u32,
    pub elapsed_ms: u64,
}

impl GatewayResponse {
    /// Collapse a terminal envelope into the caller-visible response.
    ///
    /// An escalation notice wins over a drafted response. A terminal envelope
    /// carrying neither, or still carrying an unhandled fault, degrades to the
    /// generic fallback.
    pub fn from_envelope(envelope: &Envelope, elapsed_ms: u64) -> Self {
        let payload = &envelope.payload;
        let (response_text, resolution_status) = match (&payload.escalation, &payload.draft) {
            (Some(record), _) => (record.notice.clone(), ResolutionStatus::Escalated),
            (None, Some(draft)) if payload.error.is_none() => {
                (draft.text.clone(), ResolutionStatus::Resolved)
            },
            _ => (GENERIC_FALLBACK_TEXT.to_string(), ResolutionStatus::Escalated),
        };
        Self {
            message_id: envelope.message_id.clone(),
            session_id: envelope.session_id.clone(),
            response_text,
            resolution_status,
            trace: envelope.metadata.trace_addresses(),
            retry_count: envelope.metadata.retry_count(),
            elapsed_ms,
        }
    }

    pub fn timed_out(message_id: impl Into<String>, session_id: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            message_id: message_id.into(),
            session_id: session_id.into(),
            response_text: TIMED_OUT_TEXT.to_string(),
            resolution_status: ResolutionStatus::TimedOut,
            trace: Vec::new(),
            retry_count: 0,
            elapsed_ms,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::*};

    fn terminal() -> Envelope {
        Envelope::new(
            Route::new(vec!["drafting-stage".into()], None),
            Payload::new("hi", "c", "s"),
            Origin::Http,
        )
    }

    fn record(notice: &str) -> EscalationRecord {
        EscalationRecord {
            outcome: EscalationOutcome::HumanHandoff,
            reason: "critical".into(),
            cause: None,
            attempts: 0,
            queue_position: Some(1),
            estimated_wait: Some("5-10 minutes".into()),
            notice: notice.into(),
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn draft_resolves() {
        let mut env = terminal();
        env.payload.draft = Some(Draft {
            text: "Your order shipped.".into(),
            template: "order_inquiry".into(),
            action_items: vec![],
        });
        env.metadata.record_hop("drafting-stage", 1);
        let resp = GatewayResponse::from_envelope(&env, 10);
        assert_eq!(resp.resolution_status, ResolutionStatus::Resolved);
        assert_eq!(resp.response_text, "Your order shipped.");
        assert_eq!(resp.trace, vec!["drafting-stage"]);
    }

    #[test]
    fn escalation_notice_wins_over_draft() {
        let mut env = terminal();
        env.payload.draft = Some(Draft {
            text: "draft".into(),
            template: "t".into(),
            action_items: vec![],
        });
        env.payload.escalation = Some(record("connecting you"));
        let resp = GatewayResponse::from_envelope(&env, 0);
        assert_eq!(resp.resolution_status, ResolutionStatus::Escalated);
        assert_eq!(resp.response_text, "connecting you");
    }

    #[test]
    fn empty_terminal_envelope_degrades() {
        let resp = GatewayResponse::from_envelope(&terminal(), 0);
        assert_eq!(resp.resolution_status, ResolutionStatus::Escalated);
        assert_eq!(resp.response_text, GENERIC_FALLBACK_TEXT);
    }

    #[test]
    fn submit_request_accepts_snake_case_aliases() {
        let req: SubmitRequest =
            serde_json::from_str(r#"{"customer_message":"hi","customer_identity":"c-1"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert_eq!(req.customer_identity, "c-1");
        assert!(req.session_id.is_none());
    }
}
