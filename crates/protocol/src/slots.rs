//! Typed contents of the payload enrichment slots.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::fault::FaultDescriptor;

// ── Classification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// 0.0..=1.0, how strongly the label holds.
    pub intensity: f64,
    /// Signed lexicon score (positive minus negative weight).
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub intent: String,
    pub confidence: f64,
    /// High-severity signal: the remaining route is replaced by escalation.
    pub critical: bool,
    /// The request needs a side-effecting action step.
    pub requires_action: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Looked up only for urgent messages, where the tier can make them critical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_tier: Option<CustomerTier>,
}

// ── Entities ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entities {
    #[serde(default)]
    pub order_numbers: Vec<String>,
    #[serde(default)]
    pub tracking_numbers: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.order_numbers.is_empty()
            && self.tracking_numbers.is_empty()
            && self.emails.is_empty()
            && self.phone_numbers.is_empty()
            && self.amounts.is_empty()
            && self.dates.is_empty()
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    #[default]
    Standard,
    Premium,
    Vip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub tier: CustomerTier,
    #[serde(default)]
    pub lifetime_orders: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<CustomerProfile>,
    #[serde(default)]
    pub orders: Vec<OrderSummary>,
    /// Most recent conversation turns for the session, oldest first.
    #[serde(default)]
    pub recent_turns: Vec<String>,
}

impl CustomerContext {
    pub fn tier(&self) -> CustomerTier {
        self.profile.as_ref().map(|p| p.tier).unwrap_or_default()
    }
}

// ── Draft / validation / execution ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub text: String,
    /// Template key the text was rendered from.
    pub template: String,
    #[serde(default)]
    pub action_items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailIssue {
    pub check: String,
    pub severity: IssueSeverity,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<GuardrailIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub succeeded: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    #[serde(default)]
    pub actions: Vec<ActionResult>,
}

// ── Escalation ───────────────────────────────────────────────────────────────

/// Escalation router state machine:
/// `received → retrying → {resolved, human_handoff, fallback_emitted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    Received,
    Retrying,
    Resolved,
    HumanHandoff,
    FallbackEmitted,
}

impl EscalationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::HumanHandoff | Self::FallbackEmitted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
    HumanHandoff,
    FallbackEmitted,
}

impl From<EscalationOutcome> for EscalationState {
    fn from(outcome: EscalationOutcome) -> Self {
        match outcome {
            EscalationOutcome::HumanHandoff => Self::HumanHandoff,
            EscalationOutcome::FallbackEmitted => Self::FallbackEmitted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    pub outcome: EscalationOutcome,
    pub reason: String,
    /// The fault that led here, for operators. Never shown to customers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FaultDescriptor>,
    /// Retries already spent on the faulting step.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait: Option<String>,
    /// Customer-facing text.
    pub notice: String,
    pub recorded_at: DateTime<Utc>,
}
