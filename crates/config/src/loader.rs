use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::SwitchyardConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchyard.toml",
    "switchyard.yaml",
    "switchyard.yml",
    "switchyard.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&substitute_env(&raw), path)
}

/// Load `path` when given, otherwise discover.
///
/// An explicit path that cannot be loaded is an error; discovery failures
/// fall back to defaults.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<SwitchyardConfig> {
    match path {
        Some(p) => load_config(p),
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./switchyard.{toml,yaml,yml,json}`
/// 2. `<user config dir>/switchyard.{toml,yaml,yml,json}`
///
/// Returns `SwitchyardConfig::default()` if nothing is found or the file
/// fails to parse.
pub fn discover_and_load() -> SwitchyardConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return SwitchyardConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        SwitchyardConfig::default()
    })
}

/// First config file present in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// The user-global config directory, e.g. `~/.config/switchyard/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchyard").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("switchyard.toml");
        std::fs::write(&toml_path, "[server]\nport = 9001\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().server.port, 9001);

        let yaml_path = dir.path().join("switchyard.yaml");
        std::fs::write(&yaml_path, "gateway:\n  request_timeout_ms: 1234\n").unwrap();
        assert_eq!(
            load_config(&yaml_path).unwrap().gateway.request_timeout_ms,
            1234
        );

        let json_path = dir.path().join("switchyard.json");
        std::fs::write(&json_path, r#"{"decision":{"confidence_threshold":0.4}}"#).unwrap();
        let cfg = load_config(&json_path).unwrap();
        assert!((cfg.decision.confidence_threshold - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.ini");
        std::fs::write(&path, "x=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_discover(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn find_in_respects_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("switchyard.json"), "{}").unwrap();
        std::fs::write(dir.path().join("switchyard.toml"), "").unwrap();
        let found = find_in(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "switchyard.toml");
    }
}
