//! Configuration loading, validation and env substitution.
//!
//! Config files: `switchyard.toml`, `switchyard.yaml`/`.yml`, or `switchyard.json`,
//! searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution anywhere in the file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_or_discover},
    schema::{
        BrokerConfig, DecisionConfig, EscalationConfig, GatewayConfig, MetricsConfig,
        PipelineConfig, RuntimeConfig, ServerConfig, SwitchyardConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config, validate_toml_str},
};
