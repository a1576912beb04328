use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PilotError, Result};
use crate::types::FunctionMode;

/// Top-level configuration for the sqlpilot server.
///
/// Loaded from `~/.sqlpilot/config.toml` by default. Credential values may
/// additionally be supplied through `SQLPILOT_API_KEY_<MODE>` environment
/// variables, which take precedence over the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            session: SessionConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl PilotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PilotConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PilotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Port the HTTP/WebSocket server listens on.
    pub port: u16,
    /// Data directory for the SQLite audit database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            data_dir: "~/.sqlpilot/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session time-to-live in seconds.
    pub ttl_secs: u64,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Actor number stamped on sessions (single-tenant deployment).
    pub actor_no: String,
    /// Organization number stamped on sessions.
    pub organization_no: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3 * 60 * 60,
            cookie_name: "sqlpilot_sid".to_string(),
            actor_no: "TESTUSER".to_string(),
            organization_no: "SYSOGNZ".to_string(),
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Chat-messages endpoint of the generation service.
    pub base_url: String,
    /// User identifier sent with every backend request.
    pub user_id: String,
    /// Deadline for one complete streamed call, in seconds.
    pub timeout_secs: u64,
    /// Per-mode access credentials.
    pub keys: AiKeys,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:18020/v1/chat-messages".to_string(),
            user_id: "sql-assistant-user".to_string(),
            timeout_secs: 60,
            keys: AiKeys::default(),
        }
    }
}

/// One access credential per function mode. Empty means unconfigured;
/// there is never a fallback from one mode to another's credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiKeys {
    pub create: String,
    pub explain: String,
    pub grammar: String,
    pub comment: String,
    pub transform: String,
}

impl AiKeys {
    /// The credential configured for the given mode (possibly empty).
    pub fn key_for(&self, mode: FunctionMode) -> &str {
        match mode {
            FunctionMode::Create => &self.create,
            FunctionMode::Explain => &self.explain,
            FunctionMode::Grammar => &self.grammar,
            FunctionMode::Comment => &self.comment,
            FunctionMode::Transform => &self.transform,
        }
    }

    /// Overlay credentials from `SQLPILOT_API_KEY_<MODE>` environment
    /// variables. Environment values take precedence over file values.
    pub fn apply_env(&mut self) {
        for mode in FunctionMode::ALL {
            let var = format!("SQLPILOT_API_KEY_{}", mode.as_str().to_uppercase());
            if let Ok(value) = std::env::var(&var) {
                if !value.trim().is_empty() {
                    *self.key_for_mut(mode) = value;
                }
            }
        }
    }

    /// Modes with no credential configured.
    pub fn missing(&self) -> Vec<FunctionMode> {
        FunctionMode::ALL
            .into_iter()
            .filter(|m| self.key_for(*m).trim().is_empty())
            .collect()
    }

    fn key_for_mut(&mut self, mode: FunctionMode) -> &mut String {
        match mode {
            FunctionMode::Create => &mut self.create,
            FunctionMode::Explain => &mut self.explain,
            FunctionMode::Grammar => &mut self.grammar,
            FunctionMode::Comment => &mut self.comment,
            FunctionMode::Transform => &mut self.transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PilotConfig::default();
        assert_eq!(config.general.port, 5000);
        assert_eq!(config.session.ttl_secs, 3 * 60 * 60);
        assert_eq!(config.session.cookie_name, "sqlpilot_sid");
        assert_eq!(config.ai.timeout_secs, 60);
        assert!(config.ai.keys.create.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = PilotConfig::default();
        config.general.port = 8080;
        config.ai.keys.create = "key-create".to_string();
        config.save(&path).unwrap();

        let loaded = PilotConfig::load(&path).unwrap();
        assert_eq!(loaded.general.port, 8080);
        assert_eq!(loaded.ai.keys.create, "key-create");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = PilotConfig::load(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config = PilotConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.port, 5000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PilotConfig = toml::from_str("[general]\nport = 9000\n").unwrap();
        assert_eq!(config.general.port, 9000);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.session.actor_no, "TESTUSER");
    }

    #[test]
    fn test_key_for_each_mode_is_distinct() {
        let keys = AiKeys {
            create: "a".into(),
            explain: "b".into(),
            grammar: "c".into(),
            comment: "d".into(),
            transform: "e".into(),
        };
        assert_eq!(keys.key_for(FunctionMode::Create), "a");
        assert_eq!(keys.key_for(FunctionMode::Explain), "b");
        assert_eq!(keys.key_for(FunctionMode::Grammar), "c");
        assert_eq!(keys.key_for(FunctionMode::Comment), "d");
        assert_eq!(keys.key_for(FunctionMode::Transform), "e");
    }

    #[test]
    fn test_missing_keys_reported() {
        let keys = AiKeys {
            create: "set".into(),
            ..AiKeys::default()
        };
        let missing = keys.missing();
        assert_eq!(missing.len(), 4);
        assert!(!missing.contains(&FunctionMode::Create));
        assert!(missing.contains(&FunctionMode::Explain));
    }
}
