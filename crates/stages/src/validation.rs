//! Guardrail checks on the drafted response.

use {
    async_trait::async_trait,
    regex::Regex,
    switchyard_protocol::{
        GuardrailIssue, IssueSeverity, Payload, PayloadPatch, StageKind, ValidationReport,
        addresses,
    },
    switchyard_runtime::{Stage, StageFault},
    tracing::warn,
};

const FORBIDDEN: &[(&str, &[&str])] = &[
    ("profanity", &["damn", "hell", "crap", "stupid", "idiot"]),
    ("legal_terms", &["sue", "lawsuit", "lawyer", "legal action", "court"]),
    ("inappropriate", &["hate", "kill", "die", "murder"]),
];

const UNAUTHORIZED_PROMISES: &[&str] = &[
    "guarantee",
    "promise",
    "definitely will",
    "for sure",
    "100% certain",
    "absolutely will",
];

const PII_PATTERNS: &[(&str, &str)] = &[
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("card_number", r"\b\d{16}\b"),
    ("card_number", r"\b\d{4}\s\d{4}\s\d{4}\s\d{4}\b"),
    ("license_number", r"\b[A-Z]{2}\d{7}\b"),
];

const TONE_MARKERS: &[&str] = &[
    "please",
    "thank",
    "appreciate",
    "understand",
    "sorry",
    "apologize",
    "concern",
    "assist",
    "help",
    "resolve",
    "support",
];

const MIN_LENGTH: usize = 10;
const MAX_LENGTH: usize = 1000;

pub struct ValidationStage {
    forbidden: Vec<(&'static str, Regex)>,
    pii: Vec<(&'static str, Regex)>,
}

impl ValidationStage {
    pub fn new() -> Result<Self, regex::Error> {
        let forbidden = FORBIDDEN
            .iter()
            .map(|(category, words)| {
                let alternation = words
                    .iter()
                    .map(|w| regex::escape(w))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).map(|re| (*category, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pii = PII_PATTERNS
            .iter()
            .map(|(check, pattern)| Regex::new(pattern).map(|re| (*check, re)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { forbidden, pii })
    }

    pub fn check(&self, text: &str) -> ValidationReport {
        let mut issues = Vec::new();
        let lower = text.to_lowercase();

        for (category, re) in &self.forbidden {
            if let Some(m) = re.find(text) {
                issues.push(GuardrailIssue {
                    check: "forbidden_content".into(),
                    severity: IssueSeverity::Critical,
                    detail: format!("{category}: '{}'", m.as_str().to_lowercase()),
                });
            }
        }

        for phrase in UNAUTHORIZED_PROMISES {
            if lower.contains(phrase) {
                issues.push(GuardrailIssue {
                    check: "unauthorized_promise".into(),
                    severity: IssueSeverity::High,
                    detail: format!("contains '{phrase}'"),
                });
            }
        }

        // Matched PII is never echoed into the report.
        for (check, re) in &self.pii {
            if re.is_match(text) && !issues.iter().any(|i| i.check == *check) {
                issues.push(GuardrailIssue {
                    check: (*check).into(),
                    severity: IssueSeverity::Critical,
                    detail: "personal data in response".into(),
                });
            }
        }

        let length = text.chars().count();
        if length < MIN_LENGTH {
            issues.push(GuardrailIssue {
                check: "length".into(),
                severity: IssueSeverity::Medium,
                detail: format!("response is only {length} characters"),
            });
        } else if length > MAX_LENGTH {
            issues.push(GuardrailIssue {
                check: "length".into(),
                severity: IssueSeverity::Low,
                detail: format!("response is {length} characters"),
            });
        }

        if !TONE_MARKERS.iter().any(|m| lower.contains(m)) {
            issues.push(GuardrailIssue {
                check: "tone".into(),
                severity: IssueSeverity::Low,
                detail: "no courtesy or empathy markers".into(),
            });
        }

        ValidationReport {
            passed: !issues
                .iter()
                .any(|i| i.severity == IssueSeverity::Critical),
            issues,
        }
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn address(&self) -> &str {
        addresses::VALIDATION
    }

    fn kind(&self) -> StageKind {
        StageKind::Validation
    }

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault> {
        let Some(draft) = &payload.draft else {
            return Err(StageFault::validation("no drafted response to validate"));
        };
        let report = self.check(&draft.text);
        if !report.passed {
            let failed: Vec<&str> = report
                .issues
                .iter()
                .filter(|i| i.severity == IssueSeverity::Critical)
                .map(|i| i.check.as_str())
                .collect();
            warn!(checks = ?failed, "draft rejected by guardrails");
            return Err(StageFault::validation(format!(
                "draft failed guardrail checks: {}",
                failed.join(", ")
            )));
        }
        Ok(PayloadPatch::validation(report))
    }
}
