//! Identifier extraction: order and tracking numbers, contact details,
//! amounts and dates.

use {
    async_trait::async_trait,
    regex::Regex,
    switchyard_protocol::{Entities, Payload, PayloadPatch, StageKind, addresses},
    switchyard_runtime::{Stage, StageFault},
};

const ORDER_PATTERNS: &[&str] = &[r"(?i)\bORD-[A-Z0-9]{6,10}\b", r"(?i)\border\s*#\s*(\d{6,10})\b"];
const TRACKING_PATTERN: &str = r"(?i)\bTRK[A-Z0-9]{6,12}\b";
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE_PATTERNS: &[&str] = &[
    r"\+1[-.\s]?\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b",
    r"\(\d{3}\)\s*\d{3}-\d{4}\b",
    r"\b\d{3}-\d{3}-\d{4}\b",
];
const AMOUNT_PATTERN: &str = r"\$\d+(?:\.\d{1,2})?";
const DATE_PATTERNS: &[&str] = &[r"\b\d{4}-\d{2}-\d{2}\b", r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b"];

pub struct EntityStage {
    orders: Vec<Regex>,
    tracking: Regex,
    email: Regex,
    phones: Vec<Regex>,
    amount: Regex,
    dates: Vec<Regex>,
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

/// Pushes `value` unless already present, keeping first-seen order.
fn push_unique(into: &mut Vec<String>, value: String) {
    if !into.contains(&value) {
        into.push(value);
    }
}

/// Value of the first capture group if the pattern has one, else the match.
fn matched_values<'t>(re: &Regex, text: &'t str) -> impl Iterator<Item = &'t str> {
    re.captures_iter(text).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str())
    })
}

impl EntityStage {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            orders: compile_all(ORDER_PATTERNS)?,
            tracking: Regex::new(TRACKING_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
            phones: compile_all(PHONE_PATTERNS)?,
            amount: Regex::new(AMOUNT_PATTERN)?,
            dates: compile_all(DATE_PATTERNS)?,
        })
    }

    pub fn extract(&self, text: &str) -> Entities {
        let mut entities = Entities::default();

        for re in &self.orders {
            for value in matched_values(re, text) {
                push_unique(&mut entities.order_numbers, value.to_uppercase());
            }
        }
        for value in matched_values(&self.tracking, text) {
            push_unique(&mut entities.tracking_numbers, value.to_uppercase());
        }
        for value in matched_values(&self.email, text) {
            push_unique(&mut entities.emails, value.to_lowercase());
        }
        for re in &self.phones {
            for value in matched_values(re, text) {
                // Shorter patterns re-match inside an already captured number.
                if !entities.phone_numbers.iter().any(|p| p.contains(value)) {
                    entities.phone_numbers.push(value.to_string());
                }
            }
        }
        for value in matched_values(&self.amount, text) {
            push_unique(&mut entities.amounts, value.to_string());
        }
        for re in &self.dates {
            for value in matched_values(re, text) {
                push_unique(&mut entities.dates, value.to_string());
            }
        }

        entities
    }
}

#[async_trait]
impl Stage for EntityStage {
    fn address(&self) -> &str {
        addresses::ENTITIES
    }

    fn kind(&self) -> StageKind {
        StageKind::Entities
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        Ok(PayloadPatch::entities(self.extract(&payload.customer_message)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Entities {
        EntityStage::new().unwrap().extract(text)
    }

    #[test]
    fn order_and_tracking_numbers_are_normalised() {
        let e = extract("Order ord-12345678 shipped as trk987654321, see also ORD-12345678");
        assert_eq!(e.order_numbers, vec!["ORD-12345678"]);
        assert_eq!(e.tracking_numbers, vec!["TRK987654321"]);
    }

    #[test]
    fn numeric_order_reference_keeps_only_the_number() {
        let e = extract("my order #4815162342 is late");
        assert_eq!(e.order_numbers, vec!["4815162342"]);
    }

    #[test]
    fn contact_details() {
        let e = extract("Reach me at Jane.Smith@Example.com or +1 555-123-4567, or (555) 987-6543");
        assert_eq!(e.emails, vec!["jane.smith@example.com"]);
        assert_eq!(e.phone_numbers, vec!["+1 555-123-4567", "(555) 987-6543"]);
    }

    #[test]
    fn amounts_and_dates() {
        let e = extract("I was charged $49.98 and $5 on 2024-03-01 and 3/2/2024");
        assert_eq!(e.amounts, vec!["$49.98", "$5"]);
        assert_eq!(e.dates, vec!["2024-03-01", "3/2/2024"]);
    }

    #[test]
    fn plain_text_has_no_entities() {
        assert!(extract("hello, I have a question").is_empty());
    }
}
