//! Sentiment, urgency and intent for the raw customer message.

use std::sync::Arc;

use {
    async_trait::async_trait,
    regex::Regex,
    switchyard_protocol::{
        Classification, CustomerTier, Payload, PayloadPatch, Sentiment, SentimentLabel,
        StageKind, Urgency, addresses,
    },
    switchyard_runtime::{Stage, StageFault},
};

use crate::{
    context::{ContextStore, DEFAULT_CALL_TIMEOUT},
    error::CollaboratorError,
    lexicon::{self, INTENSIFIERS, NEGATIONS, NEGATIVE, POSITIVE, URGENCY},
};

const INTENSIFIER_WEIGHT: f64 = 1.5;
const CONTEXT_WINDOW: usize = 2;
const LABEL_THRESHOLD: f64 = 0.5;
/// Net lexicon score at or below which a message counts as severely negative.
const SEVERE_NEGATIVE_SCORE: f64 = -3.0;

pub const LEGAL_THREAT: &str = "legal_threat";
pub const GENERAL_INQUIRY: &str = "general_inquiry";

/// Intent rules, first match wins.
const INTENT_RULES: &[(&str, f64, &[&str])] = &[
    (LEGAL_THREAT, 0.8, &[
        "lawyer", "lawyers", "legal", "sue", "suing", "lawsuit", "court", "attorney",
    ]),
    ("order_inquiry", 0.7, &[
        "order", "orders", "ordered", "tracking", "track", "status", "shipped",
    ]),
    ("delivery_issue", 0.7, &[
        "delivery", "deliver", "delivered", "shipping", "carrier", "package",
    ]),
    ("product_complaint", 0.7, &[
        "broken", "defective", "damaged", "wrong", "faulty",
    ]),
    ("return_request", 0.7, &["return", "returns", "exchange", "send back"]),
    ("cancellation_request", 0.7, &["cancel", "cancellation", "cancelled"]),
    ("billing_question", 0.7, &[
        "refund", "money back", "charge", "charged", "billing", "invoice",
    ]),
    ("escalation_request", 0.8, &["manager", "supervisor", "escalate"]),
    ("account_issue", 0.7, &["account", "login", "password", "sign in"]),
    ("compliment", 0.6, &["thank", "thanks", "great", "excellent", "love"]),
];

const GENERAL_CONFIDENCE: f64 = 0.3;

/// Intents whose handling needs a side-effecting action step.
const ACTIONABLE_INTENTS: &[&str] = &["cancellation_request", "return_request"];

/// Urgency at or above which a VIP customer is handed to a human.
const VIP_URGENCY: Urgency = Urgency::High;

pub struct ClassificationStage {
    urgency_patterns: Vec<Regex>,
    intent_rules: Vec<(&'static str, f64, Regex)>,
    /// Tier lookup for urgent messages. Without it the VIP rule is off.
    profiles: Option<Arc<dyn ContextStore>>,
}

impl ClassificationStage {
    pub fn new() -> Result<Self, regex::Error> {
        let urgency_patterns = lexicon::URGENCY_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let intent_rules = INTENT_RULES
            .iter()
            .map(|(intent, confidence, keywords)| {
                let alternation = keywords
                    .iter()
                    .map(|k| k.replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                    .map(|re| (*intent, *confidence, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            urgency_patterns,
            intent_rules,
            profiles: None,
        })
    }

    #[must_use]
    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.profiles = Some(store);
        self
    }

    pub fn classify(&self, text: &str) -> Classification {
        let tokens = lexicon::tokenize(text);
        let mut keywords = Vec::new();

        let sentiment = sentiment(&tokens, &mut keywords);
        let urgency = self.urgency(text, &tokens, &mut keywords);
        let (intent, confidence) = self.intent(text, &mut keywords);

        let critical = urgency == Urgency::Critical
            || intent == LEGAL_THREAT
            || sentiment.score <= SEVERE_NEGATIVE_SCORE;
        let requires_action = ACTIONABLE_INTENTS.contains(&intent);

        keywords.dedup();
        Classification {
            sentiment,
            urgency,
            intent: intent.to_string(),
            confidence,
            critical,
            requires_action,
            keywords,
            customer_tier: None,
        }
    }

    /// Mark an urgent message from a VIP customer critical.
    async fn apply_tier(
        &self,
        identity: &str,
        classification: &mut Classification,
    ) -> Result<(), StageFault> {
        let Some(store) = &self.profiles else {
            return Ok(());
        };
        if classification.urgency < VIP_URGENCY {
            return Ok(());
        }
        let lookup = tokio::time::timeout(DEFAULT_CALL_TIMEOUT, store.profile(identity));
        let profile = match lookup.await {
            Ok(Ok(profile)) => profile,
            Ok(Err(e)) => return Err(StageFault::dependency(e.to_string())),
            Err(_) => {
                return Err(StageFault::dependency(
                    CollaboratorError::Timeout {
                        service: "customer store",
                        timeout_ms: u64::try_from(DEFAULT_CALL_TIMEOUT.as_millis())
                            .unwrap_or(u64::MAX),
                    }
                    .to_string(),
                ));
            },
        };
        let tier = profile.map(|p| p.tier).unwrap_or_default();
        classification.customer_tier = Some(tier);
        if tier == CustomerTier::Vip {
            classification.critical = true;
        }
        Ok(())
    }

    fn urgency(&self, text: &str, tokens: &[String], keywords: &mut Vec<String>) -> Urgency {
        let mut score = 0u32;
        for token in tokens {
            if lexicon::contains(URGENCY, token) {
                score += 1;
                keywords.push(token.clone());
            }
        }
        score += 2 * self
            .urgency_patterns
            .iter()
            .filter(|re| re.is_match(text))
            .count() as u32;

        match score {
            5.. => Urgency::Critical,
            3.. => Urgency::High,
            1.. => Urgency::Medium,
            0 => Urgency::Low,
        }
    }

    fn intent(&self, text: &str, keywords: &mut Vec<String>) -> (&'static str, f64) {
        for (intent, confidence, re) in &self.intent_rules {
            if let Some(m) = re.find(text) {
                keywords.push(m.as_str().to_lowercase());
                return (*intent, *confidence);
            }
        }
        (GENERAL_INQUIRY, GENERAL_CONFIDENCE)
    }
}

fn sentiment(tokens: &[String], keywords: &mut Vec<String>) -> Sentiment {
    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut hits = 0u32;

    for (i, token) in tokens.iter().enumerate() {
        let polarity = if lexicon::contains(POSITIVE, token) {
            1.0
        } else if lexicon::contains(NEGATIVE, token) {
            -1.0
        } else {
            continue;
        };
        hits += 1;
        keywords.push(token.clone());

        let weight = if lexicon::preceded_by(tokens, i, CONTEXT_WINDOW, INTENSIFIERS) {
            INTENSIFIER_WEIGHT
        } else {
            1.0
        };
        let polarity = if lexicon::preceded_by(tokens, i, CONTEXT_WINDOW, NEGATIONS) {
            -polarity
        } else {
            polarity
        };
        if polarity > 0.0 {
            positive += weight;
        } else {
            negative += weight;
        }
    }

    if hits == 0 {
        return Sentiment {
            label: SentimentLabel::Neutral,
            intensity: 0.0,
            score: 0.0,
        };
    }

    let score = positive - negative;
    let label = if score > LABEL_THRESHOLD {
        SentimentLabel::Positive
    } else if score < -LABEL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };
    Sentiment {
        label,
        intensity: (score.abs() / f64::from(hits)).min(1.0),
        score,
    }
}

#[async_trait]
impl Stage for ClassificationStage {
    fn address(&self) -> &str {
        addresses::CLASSIFICATION
    }

    fn kind(&self) -> StageKind {
        StageKind::Classification
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        let mut classification = self.classify(&payload.customer_message);
        self.apply_tier(&payload.customer_identity, &mut classification).await?;
        tracing::debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            urgency = ?classification.urgency,
            critical = classification.critical,
            "message classified"
        );
        Ok(PayloadPatch::classification(classification))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::context::{FlakyContextStore, InMemoryContextStore},
        rstest::rstest,
        switchyard_protocol::FaultKind,
    };

    fn stage() -> ClassificationStage {
        ClassificationStage::new().unwrap()
    }

    #[rstest]
    #[case("Where is my order ORD-12345678?", "order_inquiry", 0.7)]
    #[case("The package never arrived, is the carrier lost?", "delivery_issue", 0.7)]
    #[case("The mug came damaged", "product_complaint", 0.7)]
    #[case("I would like to send back these shoes", "return_request", 0.7)]
    #[case("Please cancel my subscription", "cancellation_request", 0.7)]
    #[case("I want my money back for the duplicate charge", "billing_question", 0.7)]
    #[case("Let me talk to a supervisor", "escalation_request", 0.8)]
    #[case("I forgot my password", "account_issue", 0.7)]
    #[case("Thanks, you folks are great", "compliment", 0.6)]
    #[case("My lawyer will hear about this", LEGAL_THREAT, 0.8)]
    #[case("Hello there", GENERAL_INQUIRY, 0.3)]
    fn intent_rules(#[case] text: &str, #[case] intent: &str, #[case] confidence: f64) {
        let c = stage().classify(text);
        assert_eq!(c.intent, intent);
        assert!((c.confidence - confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "border" must not trigger the order rule.
        let c = stage().classify("We live near the border");
        assert_eq!(c.intent, GENERAL_INQUIRY);
    }

    #[test]
    fn legal_threat_is_critical() {
        let c = stage().classify("I am going to sue you");
        assert!(c.critical);
    }

    #[test]
    fn sentiment_handles_negation_and_intensifiers() {
        let s = stage().classify("This is really great").sentiment;
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!((s.score - 1.5).abs() < f64::EPSILON);

        let s = stage().classify("This is not good").sentiment;
        assert_eq!(s.label, SentimentLabel::Negative);

        let s = stage().classify("Hello there").sentiment;
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.intensity, 0.0);
    }

    #[test]
    fn severe_negativity_is_critical() {
        let c = stage().classify("Terrible, awful, useless and rude service");
        assert_eq!(c.sentiment.label, SentimentLabel::Negative);
        assert!(c.critical);

        let c = stage().classify("My order arrived late");
        assert!(!c.critical);
    }

    #[rstest]
    #[case("Can you look at this", Urgency::Low)]
    #[case("Please reply soon", Urgency::Medium)]
    #[case("I need this today", Urgency::High)]
    #[case("URGENT: I need it immediately, the deadline is today", Urgency::Critical)]
    fn urgency_levels(#[case] text: &str, #[case] expected: Urgency) {
        assert_eq!(stage().classify(text).urgency, expected);
    }

    #[test]
    fn actionable_intents_require_action() {
        assert!(stage().classify("Please cancel it").requires_action);
        assert!(stage().classify("I want to return this").requires_action);
        assert!(!stage().classify("Where is my order?").requires_action);
    }

    fn with_demo_store() -> ClassificationStage {
        stage().with_context_store(Arc::new(InMemoryContextStore::with_demo_data()))
    }

    #[rstest]
    #[case("jane.smith@example.com", "I need my order today", true)]
    #[case("jane.smith@example.com", "Where is my order?", false)]
    #[case("john.doe@example.com", "I need my order today", false)]
    #[case("nobody@example.com", "I need my order today", false)]
    #[tokio::test]
    async fn urgent_vip_messages_are_critical(
        #[case] identity: &str,
        #[case] text: &str,
        #[case] critical: bool,
    ) {
        let payload = Payload::new(text, identity, "s1");
        let patch = with_demo_store().process(&payload).await.unwrap();
        assert_eq!(patch.classification.unwrap().critical, critical);
    }

    #[tokio::test]
    async fn tier_is_recorded_only_when_looked_up() {
        let stage = with_demo_store();
        let urgent = Payload::new("I need my order today", "jane.smith@example.com", "s1");
        let c = stage.process(&urgent).await.unwrap().classification.unwrap();
        assert_eq!(c.urgency, Urgency::High);
        assert_eq!(c.customer_tier, Some(CustomerTier::Vip));

        let calm = Payload::new("Where is my order?", "jane.smith@example.com", "s1");
        let c = stage.process(&calm).await.unwrap().classification.unwrap();
        assert_eq!(c.customer_tier, None);
    }

    #[tokio::test]
    async fn failed_tier_lookup_is_a_dependency_fault() {
        let store = FlakyContextStore::new(Arc::new(InMemoryContextStore::with_demo_data()), 1);
        let stage = stage().with_context_store(Arc::new(store));
        let payload = Payload::new("I need my order today", "jane.smith@example.com", "s1");
        let fault = stage.process(&payload).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Dependency);
        assert!(stage.process(&payload).await.unwrap().classification.unwrap().critical);
    }

    #[tokio::test]
    async fn process_is_deterministic() {
        let stage = stage();
        let payload = Payload::new("Where is my order? I need it today!", "a@b.c", "s1");
        let first = stage.process(&payload).await.unwrap();
        let second = stage.process(&payload).await.unwrap();
        assert_eq!(first, second);
        assert!(first.classification.is_some());
    }
}
