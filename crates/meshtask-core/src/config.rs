//! Configuration system for meshtask.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. explicit path (`--config`)
//!   2. $MESHTASK_CONFIG
//!   3. $XDG_CONFIG_HOME/meshtask/config.toml
//!   4. ~/.config/meshtask/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::task::Opcode;

/// Response wait used when `wait_secs` is not configured.
pub const DEFAULT_WAIT_SECS: u64 = 5;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtaskConfig {
    pub mqtt: MqttConfig,
    pub editor: EditorConfig,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Seconds to wait for device responses. Unset = 5.
    pub wait_secs: Option<u64>,
    pub topics: TopicsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Batches are published here.
    pub command: String,
    /// Device replies arrive here.
    pub response: String,
    /// Periodic measurements; only read by `meshtask watch`.
    pub telemetry: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Editor command. Unset = $EDITOR.
    pub command: Option<String>,
}

/// When `auto: true` demands `delay` and `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMetadataMode {
    /// Only for opcodes listed in `scheduled_opcodes`.
    #[default]
    Opcodes,
    /// For every opcode.
    Always,
    /// Never; schedule fields are always stripped.
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub auto_metadata: AutoMetadataMode,
    pub scheduled_opcodes: Vec<Opcode>,
    /// Accepted opcodes.
    pub opcodes: Vec<Opcode>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "meshtask".to_string(),
            wait_secs: None,
            topics: TopicsConfig::default(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            command: "/sensors/commands".to_string(),
            response: "/sensors/results".to_string(),
            telemetry: "/sensors/results/dashboard".to_string(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            auto_metadata: AutoMetadataMode::Opcodes,
            scheduled_opcodes: vec![Opcode::GetStatus],
            opcodes: Opcode::ALL.to_vec(),
        }
    }
}

impl MqttConfig {
    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.wait_secs.unwrap_or(DEFAULT_WAIT_SECS))
    }

    /// Reject settings a session cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("mqtt.host"));
        }
        if self.port == 0 {
            return Err(ConfigError::Missing("mqtt.port"));
        }
        if self.topics.command.trim().is_empty() {
            return Err(ConfigError::Missing("mqtt.topics.command"));
        }
        if self.topics.response.trim().is_empty() {
            return Err(ConfigError::Missing("mqtt.topics.response"));
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshtask")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("missing {0} param, it is empty")]
    Missing(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshtaskConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            MeshtaskConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHTASK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config at `path` if none exists there.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = MeshtaskConfig::default().to_toml()?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Apply MESHTASK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MESHTASK_MQTT__HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = var("MESHTASK_MQTT__PORT") {
            if let Ok(p) = v.parse() {
                self.mqtt.port = p;
            }
        }
        if let Some(v) = var("MESHTASK_MQTT__WAIT_SECS") {
            if let Ok(s) = v.parse() {
                self.mqtt.wait_secs = Some(s);
            }
        }
        if let Some(v) = var("MESHTASK_MQTT__TOPICS__COMMAND") {
            self.mqtt.topics.command = v;
        }
        if let Some(v) = var("MESHTASK_MQTT__TOPICS__RESPONSE") {
            self.mqtt.topics.response = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = MeshtaskConfig::default();
        assert!(config.mqtt.validate().is_ok());
        assert_eq!(config.mqtt.wait_duration(), Duration::from_secs(5));
        assert_eq!(config.schema.scheduled_opcodes, vec![Opcode::GetStatus]);
        assert_eq!(config.schema.opcodes.len(), 6);
    }

    #[test]
    fn validate_rejects_empty_settings() {
        let mut mqtt = MqttConfig::default();
        mqtt.host = "  ".into();
        assert!(matches!(mqtt.validate(), Err(ConfigError::Missing("mqtt.host"))));

        let mut mqtt = MqttConfig::default();
        mqtt.port = 0;
        assert!(matches!(mqtt.validate(), Err(ConfigError::Missing("mqtt.port"))));

        let mut mqtt = MqttConfig::default();
        mqtt.topics.response.clear();
        assert!(matches!(
            mqtt.validate(),
            Err(ConfigError::Missing("mqtt.topics.response"))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        // Drive apply_overrides directly without touching process env
        let env: HashMap<&str, &str> = [
            ("MESHTASK_MQTT__HOST", "broker.local"),
            ("MESHTASK_MQTT__PORT", "8883"),
            ("MESHTASK_MQTT__WAIT_SECS", "12"),
            ("MESHTASK_MQTT__TOPICS__COMMAND", "/cmd"),
        ]
        .into_iter()
        .collect();

        let mut config = MeshtaskConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.wait_duration(), Duration::from_secs(12));
        assert_eq!(config.mqtt.topics.command, "/cmd");
        assert_eq!(config.mqtt.topics.response, "/sensors/results");
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let mut config = MeshtaskConfig::default();
        config.apply_overrides(|k| (k == "MESHTASK_MQTT__PORT").then(|| "nope".to_string()));
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let text = r#"
            [mqtt]
            host = "10.0.0.2"
            wait_secs = 9

            [schema]
            auto_metadata = "always"
        "#;
        let config: MeshtaskConfig = toml::from_str(text).unwrap();
        assert_eq!(config.mqtt.host, "10.0.0.2");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.wait_secs, Some(9));
        assert_eq!(config.mqtt.topics.command, "/sensors/commands");
        assert_eq!(config.schema.auto_metadata, AutoMetadataMode::Always);
        assert_eq!(config.schema.scheduled_opcodes, vec![Opcode::GetStatus]);
    }

    #[test]
    fn write_default_if_missing_creates_file() {
        let tmp = std::env::temp_dir().join(format!("meshtask-config-test-{}", std::process::id()));
        let config_path = tmp.join("nested").join("config.toml");

        MeshtaskConfig::write_default_if_missing(&config_path)
            .expect("write_default_if_missing failed");
        assert!(config_path.exists());

        let config = MeshtaskConfig::load_from(&config_path).expect("load should succeed");
        assert_eq!(config.schema.opcodes, Opcode::ALL.to_vec());
        assert_eq!(config.editor.command, None);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unparsable_file_reports_path() {
        let tmp = std::env::temp_dir().join(format!("meshtask-bad-config-{}", std::process::id()));
        std::fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("config.toml");
        std::fs::write(&path, "[mqtt\nhost=").unwrap();

        let err = MeshtaskConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(ref p, _) if p == &path));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
