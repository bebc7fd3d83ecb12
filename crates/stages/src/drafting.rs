//! Templated response drafting.

use {
    async_trait::async_trait,
    switchyard_protocol::{
        Classification, CustomerContext, CustomerTier, Draft, Entities, Payload, PayloadPatch,
        SentimentLabel, StageKind, Urgency, addresses,
    },
    switchyard_runtime::{Stage, StageFault},
};

use crate::classification::GENERAL_INQUIRY;

fn template(intent: &str, label: SentimentLabel) -> &'static str {
    use SentimentLabel::{Negative, Neutral, Positive};
    match (intent, label) {
        ("order_inquiry", Positive) => {
            "Thank you for your kind words! I'm glad to help you with your order inquiry. Let me track that for you right away."
        },
        ("order_inquiry", Neutral) => "I can help you check on your order status.",
        ("order_inquiry", Negative) => {
            "I understand you're concerned about your order, and I'm here to help resolve this."
        },
        ("delivery_issue", Positive) => {
            "I appreciate you reaching out! I'm glad to help you track your delivery."
        },
        ("delivery_issue", Neutral) => "Let me look into your delivery status for you.",
        ("delivery_issue", Negative) => {
            "I sincerely apologize for the delivery issues you're experiencing. Let me look into this right away."
        },
        ("product_complaint", Positive) => {
            "Thank you for contacting us! I'm glad to help with any product concerns you have."
        },
        ("product_complaint", Neutral) => "I can assist you with your product issue.",
        ("product_complaint", Negative) => {
            "I'm very sorry about the problems with your product. This isn't the experience we want for our customers."
        },
        ("return_request", Positive) => {
            "Thank you for being such a valued customer! I'm glad to help you with your return request."
        },
        ("return_request", Neutral) => "I can process your return request for you.",
        ("return_request", Negative) => {
            "I understand you need to return this item, and I'll make sure we handle this smoothly for you."
        },
        ("cancellation_request", Negative) => {
            "I'm sorry to hear you want to cancel. I can help you with your cancellation request."
        },
        ("cancellation_request", _) => "I can help you with your cancellation request.",
        ("billing_question", Positive) => {
            "Thank you for reaching out! I'm glad to help clarify any billing questions you have."
        },
        ("billing_question", Neutral) => "I can help explain your billing details.",
        ("billing_question", Negative) => {
            "I apologize for any confusion about your billing. Let me get this sorted out for you."
        },
        ("escalation_request", Positive) => {
            "Thank you for your feedback! I'm glad to arrange for you to speak with a supervisor."
        },
        ("escalation_request", Neutral) => {
            "I can connect you with a manager to discuss your concerns."
        },
        ("escalation_request", Negative) => {
            "I completely understand your frustration and will escalate this to a supervisor right away."
        },
        ("account_issue", Negative) => {
            "I'm sorry you're having trouble with your account. Let me help you get back in."
        },
        ("account_issue", _) => "I can help you with your account.",
        ("compliment", _) => "Thank you so much for your kind words! We really appreciate your feedback.",
        (_, Positive) => {
            "Thank you for contacting us! I'm glad to help you with your inquiry."
        },
        (_, Neutral) => "I'm here to help you with your inquiry.",
        (_, Negative) => {
            "I apologize for any inconvenience. Let me help resolve your concern right away."
        },
    }
}

fn action_items(intent: &str, urgency: Urgency) -> Vec<String> {
    let items: &[&str] = match intent {
        "order_inquiry" => &["check_order_status", "provide_tracking_info"],
        "delivery_issue" => &["track_package", "contact_carrier"],
        "product_complaint" => &["investigate_product_issue", "offer_replacement_or_refund"],
        "return_request" => &["generate_return_label", "process_return"],
        "billing_question" => &["review_billing_details", "explain_charges"],
        "cancellation_request" => &["check_cancellation_eligibility", "process_cancellation"],
        "escalation_request" => &["escalate_to_supervisor", "schedule_callback"],
        "account_issue" => &["verify_identity", "reset_credentials"],
        _ => &[],
    };
    let mut out: Vec<String> = items.iter().map(|s| (*s).to_string()).collect();
    if urgency >= Urgency::High {
        out.insert(0, "prioritize_request".into());
    }
    out
}

fn with_tier_prefix(text: &str, tier: CustomerTier) -> String {
    let prefix = match tier {
        CustomerTier::Vip => "As one of our valued VIP customers, ",
        CustomerTier::Premium => "As a premium customer, ",
        CustomerTier::Standard => return text.to_string(),
    };
    let mut chars = text.chars();
    match chars.next() {
        // Keep "I" capitalised.
        Some(first) if text.starts_with("I ") || text.starts_with("I'") => {
            format!("{prefix}{first}{}", chars.as_str())
        },
        Some(first) => format!("{prefix}{}{}", first.to_lowercase(), chars.as_str()),
        None => prefix.trim_end().to_string(),
    }
}

/// A status line for the order the customer mentioned, or their only order.
fn order_status_line(entities: Option<&Entities>, context: Option<&CustomerContext>) -> Option<String> {
    let orders = &context?.orders;
    let mentioned = entities.map(|e| e.order_numbers.as_slice()).unwrap_or_default();
    let order = match mentioned.first() {
        Some(_) => orders.iter().find(|o| mentioned.contains(&o.order_id))?,
        None if orders.len() == 1 => &orders[0],
        None => return None,
    };
    let status = order.status.replace('_', " ");
    Some(match &order.tracking_number {
        Some(trk) => format!(
            "Order {} is currently {status}, tracking number {trk}.",
            order.order_id
        ),
        None => format!("Order {} is currently {status}.", order.order_id),
    })
}

#[derive(Default)]
pub struct DraftingStage;

impl DraftingStage {
    pub fn new() -> Self {
        Self
    }

    pub fn draft(&self, payload: &Payload) -> Draft {
        let (intent, label, urgency) = match &payload.classification {
            Some(Classification {
                intent,
                sentiment,
                urgency,
                ..
            }) => (intent.as_str(), sentiment.label, *urgency),
            None => (GENERAL_INQUIRY, SentimentLabel::Neutral, Urgency::Low),
        };
        let tier = payload
            .context
            .as_ref()
            .map(CustomerContext::tier)
            .unwrap_or_default();

        let mut text = with_tier_prefix(template(intent, label), tier);
        if matches!(intent, "order_inquiry" | "delivery_issue")
            && let Some(line) =
                order_status_line(payload.entities.as_ref(), payload.context.as_ref())
        {
            text.push(' ');
            text.push_str(&line);
        }

        Draft {
            text,
            template: format!("{intent}.{}", label_key(label)),
            action_items: action_items(intent, urgency),
        }
    }
}

fn label_key(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "positive",
        SentimentLabel::Neutral => "neutral",
        SentimentLabel::Negative => "negative",
    }
}

#[async_trait]
impl Stage for DraftingStage {
    fn address(&self) -> &str {
        addresses::DRAFTING
    }

    fn kind(&self) -> StageKind {
        StageKind::Drafting
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        Ok(PayloadPatch::draft(self.draft(payload)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::classification::ClassificationStage,
        switchyard_protocol::{CustomerProfile, OrderSummary},
    };

    fn payload(text: &str, tier: Option<CustomerTier>) -> Payload {
        let mut p = Payload::new(text, "c@example.com", "s1");
        p.classification = Some(ClassificationStage::new().unwrap().classify(text));
        p.context = tier.map(|tier| CustomerContext {
            profile: Some(CustomerProfile {
                customer_id: "c1".into(),
                name: None,
                email: None,
                tier,
                lifetime_orders: 1,
            }),
            orders: vec![OrderSummary {
                order_id: "ORD-12345678".into(),
                status: "out_for_delivery".into(),
                tracking_number: Some("TRK123456789".into()),
            }],
            recent_turns: vec![],
        });
        p
    }

    #[test]
    fn neutral_order_inquiry() {
        let draft = DraftingStage::new().draft(&payload("Can you check my order?", None));
        assert_eq!(draft.template, "order_inquiry.neutral");
        assert_eq!(draft.text, "I can help you check on your order status.");
        assert_eq!(draft.action_items, vec!["check_order_status", "provide_tracking_info"]);
    }

    #[test]
    fn vip_prefix_and_order_status() {
        let draft = DraftingStage::new().draft(&payload(
            "Can you check my order?",
            Some(CustomerTier::Vip),
        ));
        assert_eq!(
            draft.text,
            "As one of our valued VIP customers, I can help you check on your order status. \
             Order ORD-12345678 is currently out for delivery, tracking number TRK123456789."
        );
    }

    #[test]
    fn premium_prefix_lowercases_first_letter() {
        let draft = DraftingStage::new().draft(&payload(
            "Thanks, you are great",
            Some(CustomerTier::Premium),
        ));
        assert!(draft.text.starts_with("As a premium customer, thank you so much"));
    }

    #[test]
    fn urgent_requests_are_prioritised() {
        let draft = DraftingStage::new().draft(&payload(
            "I need to cancel immediately, it is urgent",
            None,
        ));
        assert_eq!(draft.action_items[0], "prioritize_request");
    }

    #[test]
    fn missing_classification_falls_back_to_general() {
        let draft = DraftingStage::new().draft(&Payload::new("hm", "c", "s"));
        assert_eq!(draft.template, "general_inquiry.neutral");
        assert!(draft.action_items.is_empty());
    }

    #[test]
    fn templates_make_no_commitments() {
        let intents = [
            "order_inquiry",
            "delivery_issue",
            "product_complaint",
            "return_request",
            "cancellation_request",
            "billing_question",
            "escalation_request",
            "account_issue",
            "compliment",
            "general_inquiry",
        ];
        for intent in intents {
            for label in [
                SentimentLabel::Positive,
                SentimentLabel::Neutral,
                SentimentLabel::Negative,
            ] {
                let text = template(intent, label).to_lowercase();
                assert!(!text.contains("promise"), "{intent}: {text}");
                assert!(!text.contains("guarantee"), "{intent}: {text}");
            }
        }
    }
}
