//! Configuration validation.
//!
//! Two layers: structural checks on the raw document (syntax, unknown or
//! misspelled keys, type errors) and semantic checks on the parsed
//! [`SwitchyardConfig`] (pipeline shape, timing relationships, zero limits).

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use switchyard_protocol::addresses;

use crate::{env_subst::substitute_env, schema::SwitchyardConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "pipeline", "timing", "limits", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "pipeline.steps[2]"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, path, message)
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Addresses a pipeline step may name.
const STEP_ADDRESSES: &[&str] = &[
    addresses::CLASSIFICATION,
    addresses::ENTITIES,
    addresses::CONTEXT,
    addresses::DRAFTING,
    addresses::VALIDATION,
    addresses::EXECUTION,
    addresses::DECISION_ROUTER,
    addresses::ESCALATION_ROUTER,
];

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys (e.g. `runtime.stage_budgets_ms`).
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "server",
            Struct(HashMap::from([("bind", Leaf), ("port", Leaf)])),
        ),
        (
            "broker",
            Struct(HashMap::from([
                ("publish_attempts", Leaf),
                ("publish_backoff_ms", Leaf),
                ("publish_backoff_max_ms", Leaf),
            ])),
        ),
        (
            "pipeline",
            Struct(HashMap::from([
                ("steps", Leaf),
                ("error_handler", Leaf),
                ("aggregation_address", Leaf),
            ])),
        ),
        (
            "runtime",
            Struct(HashMap::from([
                ("max_in_flight", Leaf),
                ("stage_budgets_ms", Map),
                ("default_budget_ms", Leaf),
            ])),
        ),
        (
            "decision",
            Struct(HashMap::from([
                ("confidence_threshold", Leaf),
                ("action_address", Leaf),
                ("escalation_address", Leaf),
            ])),
        ),
        (
            "escalation",
            Struct(HashMap::from([
                ("max_retries", Leaf),
                ("backoff_base_ms", Leaf),
                ("backoff_max_ms", Leaf),
                ("cancellation_ttl_secs", Leaf),
            ])),
        ),
        (
            "gateway",
            Struct(HashMap::from([
                ("request_timeout_ms", Leaf),
                ("heartbeat_interval_ms", Leaf),
                ("heartbeat_max_missed", Leaf),
                ("max_frame_bytes", Leaf),
            ])),
        ),
        ("metrics", Struct(HashMap::from([("enabled", Leaf)]))),
    ]))
}

// ── Suggestions ─────────────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

fn did_you_mean(needle: &str, candidates: &[&str]) -> String {
    suggest(needle, candidates, 3)
        .map(|s| format!(" (did you mean \"{s}\"?)"))
        .unwrap_or_default()
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Validate a config file at `path`, or the discovered file when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file);

    let Some(actual_path) = config_path else {
        let mut diagnostics = vec![Diagnostic {
            severity: Severity::Info,
            category: "file-ref",
            path: String::new(),
            message: "no config file found; using defaults".into(),
        }];
        diagnostics.extend(validate_config(&SwitchyardConfig::default()));
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let raw = match std::fs::read_to_string(&actual_path) {
        Ok(raw) => substitute_env(&raw),
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::error(
                    "syntax",
                    "",
                    format!("failed to read config file: {e}"),
                )],
                config_path: Some(actual_path),
            };
        },
    };

    let ext = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml");
    let document = match ext {
        "toml" => toml::from_str::<toml::Value>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| e.to_string()),
        other => Err(format!("unsupported config format: .{other}")),
    };

    let mut result = match document {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::error("syntax", "", e)],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate a TOML document without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let value = toml::from_str::<toml::Value>(toml_str)
        .map_err(|e| format!("TOML syntax error: {e}"))
        .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string()));
    match value {
        Ok(value) => validate_value(&value),
        Err(message) => ValidationResult {
            diagnostics: vec![Diagnostic::error("syntax", "", message)],
            config_path: None,
        },
    }
}

fn validate_value(value: &serde_json::Value) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<SwitchyardConfig>(value.clone()) {
        Ok(config) => diagnostics.extend(validate_config(&config)),
        Err(e) => diagnostics.push(Diagnostic::error("type-error", "", format!("type error: {e}"))),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => diagnostics.push(Diagnostic::error(
                "unknown-field",
                path,
                format!("unknown field{}", did_you_mean(key, &known)),
            )),
        }
    }
}

/// Semantic checks on a parsed config.
#[must_use]
pub fn validate_config(config: &SwitchyardConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    check_pipeline(config, &mut out);
    check_timing(config, &mut out);
    check_limits(config, &mut out);
    check_server(config, &mut out);
    out
}

fn check_pipeline(config: &SwitchyardConfig, out: &mut Vec<Diagnostic>) {
    let pipeline = &config.pipeline;

    if pipeline.steps.is_empty() {
        out.push(Diagnostic::error(
            "pipeline",
            "pipeline.steps",
            "pipeline must contain at least one step",
        ));
    }

    let mut seen = HashSet::new();
    for (i, step) in pipeline.steps.iter().enumerate() {
        let path = format!("pipeline.steps[{i}]");
        if *step == pipeline.aggregation_address {
            out.push(Diagnostic::error(
                "pipeline",
                path,
                "the aggregation address is implicit and must not appear in steps",
            ));
        } else if !STEP_ADDRESSES.contains(&step.as_str()) {
            out.push(Diagnostic::error(
                "pipeline",
                path,
                format!(
                    "unknown address \"{step}\"{}",
                    did_you_mean(step, STEP_ADDRESSES)
                ),
            ));
        } else if !seen.insert(step.as_str()) {
            out.push(Diagnostic::warning(
                "pipeline",
                path,
                format!("\"{step}\" appears more than once"),
            ));
        }
    }

    if !STEP_ADDRESSES.contains(&pipeline.error_handler.as_str()) {
        out.push(Diagnostic::error(
            "pipeline",
            "pipeline.error_handler",
            format!(
                "unknown address \"{}\"{}",
                pipeline.error_handler,
                did_you_mean(&pipeline.error_handler, STEP_ADDRESSES)
            ),
        ));
    }

    if pipeline.aggregation_address.is_empty() {
        out.push(Diagnostic::error(
            "pipeline",
            "pipeline.aggregation_address",
            "aggregation address must not be empty",
        ));
    }

    if !pipeline
        .steps
        .iter()
        .any(|s| s == addresses::DECISION_ROUTER)
    {
        out.push(Diagnostic::warning(
            "pipeline",
            "pipeline.steps",
            "no decision-router step; critical and low-confidence requests will not be escalated",
        ));
    }

    for (field, value) in [
        ("decision.action_address", &config.decision.action_address),
        (
            "decision.escalation_address",
            &config.decision.escalation_address,
        ),
    ] {
        if !STEP_ADDRESSES.contains(&value.as_str()) {
            out.push(Diagnostic::error(
                "pipeline",
                field,
                format!("unknown address \"{value}\"{}", did_you_mean(value, STEP_ADDRESSES)),
            ));
        }
    }

    for key in config.runtime.stage_budgets_ms.keys() {
        if !STEP_ADDRESSES.contains(&key.as_str()) {
            out.push(Diagnostic::warning(
                "pipeline",
                format!("runtime.stage_budgets_ms.{key}"),
                format!(
                    "budget for unknown address{}",
                    did_you_mean(key, STEP_ADDRESSES)
                ),
            ));
        }
    }

    let threshold = config.decision.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        out.push(Diagnostic::error(
            "pipeline",
            "decision.confidence_threshold",
            format!("{threshold} is outside 0.0..=1.0"),
        ));
    }
}

fn check_timing(config: &SwitchyardConfig, out: &mut Vec<Diagnostic>) {
    let max_budget = config.runtime.max_budget_ms();
    if config.gateway.request_timeout_ms <= max_budget {
        out.push(Diagnostic::error(
            "timing",
            "gateway.request_timeout_ms",
            format!(
                "request timeout ({} ms) must exceed the largest stage budget ({max_budget} ms)",
                config.gateway.request_timeout_ms
            ),
        ));
    }

    let esc = &config.escalation;
    if esc.backoff_base_ms > esc.backoff_max_ms {
        out.push(Diagnostic::warning(
            "timing",
            "escalation.backoff_base_ms",
            "base backoff exceeds backoff_max_ms; every retry waits the maximum",
        ));
    }
    let broker = &config.broker;
    if broker.publish_backoff_ms > broker.publish_backoff_max_ms {
        out.push(Diagnostic::warning(
            "timing",
            "broker.publish_backoff_ms",
            "base backoff exceeds publish_backoff_max_ms",
        ));
    }
}

fn check_limits(config: &SwitchyardConfig, out: &mut Vec<Diagnostic>) {
    let zero_checks: [(&str, u64); 7] = [
        (
            "broker.publish_attempts",
            u64::from(config.broker.publish_attempts),
        ),
        (
            "escalation.max_retries",
            u64::from(config.escalation.max_retries),
        ),
        ("runtime.max_in_flight", config.runtime.max_in_flight as u64),
        ("runtime.default_budget_ms", config.runtime.default_budget_ms),
        (
            "gateway.heartbeat_interval_ms",
            config.gateway.heartbeat_interval_ms,
        ),
        (
            "gateway.heartbeat_max_missed",
            u64::from(config.gateway.heartbeat_max_missed),
        ),
        ("gateway.max_frame_bytes", config.gateway.max_frame_bytes as u64),
    ];
    for (path, value) in zero_checks {
        if value == 0 {
            out.push(Diagnostic::error("limits", path, "must be greater than zero"));
        }
    }

    if config.gateway.max_frame_bytes > 0 && config.gateway.max_frame_bytes < 1024 {
        out.push(Diagnostic::warning(
            "limits",
            "gateway.max_frame_bytes",
            "frames under 1 KiB will reject most submit requests",
        ));
    }
}

fn check_server(config: &SwitchyardConfig, out: &mut Vec<Diagnostic>) {
    let bind = config.server.bind.as_str();
    if !matches!(bind, "127.0.0.1" | "localhost" | "::1") {
        out.push(Diagnostic::warning(
            "security",
            "server.bind",
            format!("binding to {bind} exposes the gateway beyond localhost"),
        ));
    }
}
