//! Application configuration.
//!
//! Loaded from YAML (`.yaml`/`.yml`) or JSON. Every field has a default, so an
//! empty file is a valid config. Relative paths are resolved against the
//! directory containing the config file.

use crate::error::{AgentError, AgentResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_STEP_DELAY_MS: u64 = 60_000;
pub const MAX_ACTIONS_PER_MINUTE: u32 = 10_000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub agent: AgentConfig,
    pub paths: PathsConfig,
}

/// Where the game bridge listens and how long to wait for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 53135,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 1_500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Pause between iterations.
    pub step_delay_ms: u64,
    /// Action budget per trailing minute; `0` disables limiting.
    pub max_actions_per_minute: u32,
    /// Static rules passed to the decision provider on every step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_text: Option<String>,
    /// How often a paused loop re-checks its signals.
    pub idle_poll_ms: u64,
    /// Upper bound on how long `stop()` waits for the worker.
    pub stop_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 250,
            max_actions_per_minute: 240,
            rules_text: None,
            idle_poll_ms: 250,
            stop_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> AgentResult<()> {
        if self.bridge.host.trim().is_empty() {
            return Err(invalid("bridge.host", "must not be empty"));
        }
        if self.bridge.port == 0 {
            return Err(invalid("bridge.port", "must be in 1..=65535"));
        }
        if self.bridge.connect_timeout_ms == 0 {
            return Err(invalid("bridge.connect_timeout_ms", "must be greater than 0"));
        }
        if self.bridge.request_timeout_ms == 0 {
            return Err(invalid("bridge.request_timeout_ms", "must be greater than 0"));
        }
        if self.agent.step_delay_ms > MAX_STEP_DELAY_MS {
            return Err(invalid(
                "agent.step_delay_ms",
                &format!("must be at most {MAX_STEP_DELAY_MS}"),
            ));
        }
        if self.agent.max_actions_per_minute > MAX_ACTIONS_PER_MINUTE {
            return Err(invalid(
                "agent.max_actions_per_minute",
                &format!("must be at most {MAX_ACTIONS_PER_MINUTE}"),
            ));
        }
        if self.agent.idle_poll_ms == 0 {
            return Err(invalid("agent.idle_poll_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Make relative paths absolute against `base_dir`.
    #[must_use]
    pub fn resolve_paths(mut self, base_dir: &Path) -> Self {
        if self.paths.logs_dir.is_relative() {
            self.paths.logs_dir = base_dir.join(&self.paths.logs_dir);
        }
        self
    }
}

fn invalid(field: &str, reason: &str) -> AgentError {
    AgentError::config(
        format!("invalid config: {field} {reason}"),
        serde_json::json!({ "field": field }),
    )
}

pub fn load_config(path: &Path) -> AgentResult<AppConfig> {
    let data = fs::read_to_string(path)
        .map_err(|err| AgentError::io(ErrorCode::Config, "failed to read config file", err))?;
    let config = parse_config(&data, is_yaml(path))?;
    config.validate()?;
    let base_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok(config.resolve_paths(&base_dir))
}

pub fn parse_config(data: &str, yaml: bool) -> AgentResult<AppConfig> {
    if yaml {
        if data.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        serde_yml::from_str(data)
            .map_err(|err| AgentError::io(ErrorCode::Config, "failed to parse yaml config", err))
    } else {
        serde_json::from_str(data)
            .map_err(|err| AgentError::io(ErrorCode::Config, "failed to parse json config", err))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = parse_config("", true).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bridge.port, 53135);
        assert_eq!(config.agent.max_actions_per_minute, 240);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = parse_config("agent:\n  step_delay_ms: 0\n", true).unwrap();
        assert_eq!(config.agent.step_delay_ms, 0);
        assert_eq!(config.agent.idle_poll_ms, 250);
        assert_eq!(config.bridge.host, "127.0.0.1");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_config(r#"{"agent": {"speed": 3}}"#, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = AppConfig::default();
        config.bridge.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.step_delay_ms = MAX_STEP_DELAY_MS + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_actions_per_minute = MAX_ACTIONS_PER_MINUTE + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_actions_per_minute = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relative_logs_dir_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "paths:\n  logs_dir: run-logs\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.paths.logs_dir, dir.path().join("run-logs"));
    }

    #[test]
    fn absolute_logs_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("abs-logs");
        let path = dir.path().join("config.json");
        let body = serde_json::json!({ "paths": { "logs_dir": logs } });
        fs::write(&path, body.to_string()).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.paths.logs_dir, logs);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
    }
}
