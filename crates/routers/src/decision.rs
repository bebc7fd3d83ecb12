//! Normal-path routing: picks the remainder of the pipeline from the
//! classification.

use {
    async_trait::async_trait,
    switchyard_config::SwitchyardConfig,
    switchyard_metrics::{counter, labels, routing},
    switchyard_protocol::{Envelope, Payload, Route, RouteDecisionRecord, addresses},
    switchyard_runtime::{Dispatch, Router},
    tracing::{debug, info, warn},
};

/// Route rewriting rules, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Replace the rest of the route with the escalation path.
    Critical,
    /// Splice the action step in after the router.
    RequiresAction,
    /// Escalate after the router; the main pipeline is abandoned.
    LowConfidence,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::RequiresAction => "requires_action",
            Self::LowConfidence => "low_confidence",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionSettings {
    pub confidence_threshold: f64,
    pub action_address: String,
    pub escalation_address: String,
    pub aggregation_address: String,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            action_address: addresses::EXECUTION.into(),
            escalation_address: addresses::ESCALATION_ROUTER.into(),
            aggregation_address: addresses::AGGREGATION.into(),
        }
    }
}

impl From<&SwitchyardConfig> for DecisionSettings {
    fn from(config: &SwitchyardConfig) -> Self {
        Self {
            confidence_threshold: config.decision.confidence_threshold,
            action_address: config.decision.action_address.clone(),
            escalation_address: config.decision.escalation_address.clone(),
            aggregation_address: config.pipeline.aggregation_address.clone(),
        }
    }
}

pub struct DecisionRouter {
    settings: DecisionSettings,
}

impl DecisionRouter {
    pub fn new(settings: DecisionSettings) -> Self {
        Self { settings }
    }

    /// The highest-priority rule matching `payload`, if any.
    pub fn decide(&self, payload: &Payload) -> Option<Rule> {
        let classification = payload.classification.as_ref()?;
        if classification.critical {
            Some(Rule::Critical)
        } else if classification.requires_action {
            Some(Rule::RequiresAction)
        } else if classification.confidence < self.settings.confidence_threshold {
            Some(Rule::LowConfidence)
        } else {
            None
        }
    }

    /// Route after applying `rule`, and whether the cursor should advance.
    fn apply(&self, rule: Rule, route: &Route) -> (Route, bool) {
        match rule {
            Rule::Critical => (
                route.replace_remaining(vec![
                    self.settings.escalation_address.clone(),
                    self.settings.aggregation_address.clone(),
                ]),
                false,
            ),
            Rule::RequiresAction => (route.splice_after_current(&self.settings.action_address), true),
            Rule::LowConfidence => (
                route.insert_escalation_after_current(&self.settings.escalation_address),
                true,
            ),
        }
    }
}

#[async_trait]
impl Router for DecisionRouter {
    fn address(&self) -> &str {
        addresses::DECISION_ROUTER
    }

    async fn route(&self, mut envelope: Envelope) -> Dispatch {
        if envelope.payload.classification.is_none() {
            warn!(message_id = %envelope.message_id, "no classification to route on, keeping route");
        }

        let Some(rule) = self.decide(&envelope.payload) else {
            counter!(routing::DECISIONS_TOTAL, labels::RULE => "default").increment(1);
            debug!(message_id = %envelope.message_id, "route unchanged");
            return Dispatch::Advance(envelope);
        };

        let (route, advance) = self.apply(rule, &envelope.route);
        info!(
            message_id = %envelope.message_id,
            rule = rule.as_str(),
            before = ?envelope.route.steps,
            after = ?route.steps,
            "route rewritten"
        );
        counter!(routing::DECISIONS_TOTAL, labels::RULE => rule.as_str()).increment(1);
        envelope.metadata.route_decisions.push(RouteDecisionRecord {
            rule: rule.as_str().to_string(),
            before: envelope.route.steps.clone(),
            after: route.steps.clone(),
        });
        envelope.route = route;

        if advance {
            Dispatch::Advance(envelope)
        } else {
            Dispatch::Divert(envelope)
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        switchyard_protocol::{
            Classification, Origin, Sentiment, SentimentLabel, Urgency, addresses::*,
        },
    };

    fn classification(critical: bool, requires_action: bool, confidence: f64) -> Classification {
        Classification {
            sentiment: Sentiment {
                label: SentimentLabel::Neutral,
                intensity: 0.0,
                score: 0.0,
            },
            urgency: Urgency::Low,
            intent: "order_inquiry".into(),
            confidence,
            critical,
            requires_action,
            keywords: vec![],
            customer_tier: None,
        }
    }

    /// Envelope sitting at the decision router after classification ran.
    fn envelope(c: Option<Classification>) -> Envelope {
        let mut route = Route::new(default_pipeline(), Some(ESCALATION_ROUTER.into()));
        route = route.advanced();
        let mut payload = Payload::new("hi", "c", "s");
        payload.classification = c;
        let mut e = Envelope::new(route, payload, Origin::Cli);
        e.metadata.record_hop(CLASSIFICATION, 1);
        e
    }

    fn router() -> DecisionRouter {
        DecisionRouter::new(DecisionSettings::default())
    }

    #[rstest]
    #[case(true, true, 0.1, Some(Rule::Critical))]
    #[case(false, true, 0.1, Some(Rule::RequiresAction))]
    #[case(false, false, 0.1, Some(Rule::LowConfidence))]
    #[case(false, false, 0.6, None)]
    fn priority_order(
        #[case] critical: bool,
        #[case] action: bool,
        #[case] confidence: f64,
        #[case] expected: Option<Rule>,
    ) {
        let e = envelope(Some(classification(critical, action, confidence)));
        assert_eq!(router().decide(&e.payload), expected);
    }

    #[tokio::test]
    async fn critical_replaces_route_with_escalation_path() {
        let dispatch = router()
            .route(envelope(Some(classification(true, true, 0.9))))
            .await;
        let Dispatch::Divert(e) = dispatch else {
            panic!("expected divert, got {dispatch:?}");
        };
        assert_eq!(e.route.steps, vec![ESCALATION_ROUTER, AGGREGATION]);
        assert_eq!(e.route.current_step, 0);
        assert_eq!(e.route.error_handler.as_deref(), Some(ESCALATION_ROUTER));
        assert_eq!(e.metadata.route_decisions.len(), 1);
        assert_eq!(e.metadata.route_decisions[0].rule, "critical");
        assert_eq!(e.metadata.route_decisions[0].before, default_pipeline());
    }

    #[tokio::test]
    async fn action_is_spliced_after_the_router() {
        let dispatch = router()
            .route(envelope(Some(classification(false, true, 0.9))))
            .await;
        let Dispatch::Advance(e) = dispatch else {
            panic!("expected advance, got {dispatch:?}");
        };
        assert_eq!(e.route.steps, vec![
            CLASSIFICATION,
            DECISION_ROUTER,
            EXECUTION,
            ENTITIES,
            CONTEXT,
            DRAFTING,
            VALIDATION,
        ]);
        // The runtime advances the cursor onto the spliced step.
        assert_eq!(e.route.advanced().current(), Some(EXECUTION));
    }

    #[tokio::test]
    async fn splicing_is_idempotent() {
        let mut e = envelope(Some(classification(false, true, 0.9)));
        e.route = e.route.splice_after_current(EXECUTION);
        let before = e.route.clone();
        let Dispatch::Advance(e) = router().route(e).await else {
            panic!("expected advance");
        };
        assert_eq!(e.route, before);
    }

    #[tokio::test]
    async fn low_confidence_escalates_and_drops_the_rest() {
        let Dispatch::Advance(e) = router()
            .route(envelope(Some(classification(false, false, 0.3))))
            .await
        else {
            panic!("expected advance");
        };
        assert_eq!(e.route.steps, vec![
            CLASSIFICATION,
            DECISION_ROUTER,
            ESCALATION_ROUTER
        ]);
        assert_eq!(e.route.advanced().current(), Some(ESCALATION_ROUTER));
    }

    #[tokio::test]
    async fn default_leaves_route_and_metadata_alone() {
        let original = envelope(Some(classification(false, false, 0.9)));
        let Dispatch::Advance(e) = router().route(original.clone()).await else {
            panic!("expected advance");
        };
        assert_eq!(e, original);
    }

    #[tokio::test]
    async fn router_never_appears_in_the_trace() {
        let Dispatch::Divert(e) = router()
            .route(envelope(Some(classification(true, false, 0.9))))
            .await
        else {
            panic!("expected divert");
        };
        assert_eq!(e.metadata.trace_addresses(), vec![CLASSIFICATION]);
    }

    #[tokio::test]
    async fn missing_classification_keeps_the_route() {
        let original = envelope(None);
        let Dispatch::Advance(e) = router().route(original.clone()).await else {
            panic!("expected advance");
        };
        assert_eq!(e.route, original.route);
    }
}
