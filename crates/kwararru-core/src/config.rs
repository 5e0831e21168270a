use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KwararruError, Result};

/// Top-level configuration for the Kwararru engine.
///
/// Loaded from `~/.kwararru/config.toml` by the host. Each section maps to one
/// engine component; every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KwararruConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub proactive: ProactiveConfig,
    #[serde(default)]
    pub call: CallConfig,
}

impl KwararruConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KwararruConfig = toml::from_str(&content)?;
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
            toml::to_string_pretty(self).map_err(|e| KwararruError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Origin + path used when building `?session=` and `?content=` share links.
    pub share_base_url: String,
    /// How long a transient notice stays visible in the UI collaborator.
    pub notice_duration_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            share_base_url: "http://localhost:5173/".to_string(),
            notice_duration_ms: 3000,
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between tombstoning a message and removing it.
    pub deletion_grace_ms: u64,
    /// Maximum length of a user turn in characters.
    pub max_message_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deletion_grace_ms: 500,
            max_message_length: 8000,
        }
    }
}

impl SessionConfig {
    pub fn deletion_grace(&self) -> Duration {
        Duration::from_millis(self.deletion_grace_ms)
    }
}

/// Proactive trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProactiveConfig {
    /// Seconds between calendar scans.
    pub calendar_interval_secs: u64,
    /// How far ahead an event may start and still produce a suggestion.
    pub calendar_lookahead_mins: u64,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            calendar_interval_secs: 300,
            calendar_lookahead_mins: 30,
        }
    }
}

impl ProactiveConfig {
    pub fn calendar_interval(&self) -> Duration {
        Duration::from_secs(self.calendar_interval_secs)
    }

    pub fn calendar_lookahead(&self) -> Duration {
        Duration::from_secs(self.calendar_lookahead_mins * 60)
    }
}

/// Call and broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Speech voice used for Agent Zero segments.
    pub agent_zero_voice: String,
    /// Speech voice used for Agent Zara segments.
    pub agent_zara_voice: String,
    /// Default news briefing location.
    pub broadcast_location: String,
    /// Default news briefing category.
    pub broadcast_category: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            agent_zero_voice: "Puck".to_string(),
            agent_zara_voice: "Kore".to_string(),
            broadcast_location: "Nigeria".to_string(),
            broadcast_category: "General".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = KwararruConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.notice_duration_ms, 3000);
        assert_eq!(config.session.deletion_grace_ms, 500);
        assert_eq!(config.proactive.calendar_interval_secs, 300);
        assert_eq!(config.proactive.calendar_lookahead_mins, 30);
        assert_eq!(config.call.broadcast_location, "Nigeria");
    }

    #[test]
    fn test_duration_helpers() {
        let config = KwararruConfig::default();
        assert_eq!(config.session.deletion_grace(), Duration::from_millis(500));
        assert_eq!(config.proactive.calendar_interval(), Duration::from_secs(300));
        assert_eq!(
            config.proactive.calendar_lookahead(),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
share_base_url = "https://kwararru.example/app"

[session]
deletion_grace_ms = 250

[proactive]
calendar_interval_secs = 60
calendar_lookahead_mins = 15

[call]
agent_zara_voice = "Aoede"
"#;
        let file = create_temp_config(content);
        let config = KwararruConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.share_base_url, "https://kwararru.example/app");
        assert_eq!(config.session.deletion_grace_ms, 250);
        assert_eq!(config.session.max_message_length, 8000);
        assert_eq!(config.proactive.calendar_interval_secs, 60);
        assert_eq!(config.proactive.calendar_lookahead_mins, 15);
        assert_eq!(config.call.agent_zara_voice, "Aoede");
        assert_eq!(config.call.agent_zero_voice, "Puck");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = KwararruConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.session.deletion_grace_ms, 500);
        assert_eq!(config.proactive.calendar_lookahead_mins, 30);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = KwararruConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = KwararruConfig::load(file.path());
        assert!(matches!(result, Err(KwararruError::Config(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = KwararruConfig::default();
        config.session.deletion_grace_ms = 750;
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = KwararruConfig::load(&path).unwrap();
        assert_eq!(reloaded.session.deletion_grace_ms, 750);
        assert_eq!(reloaded.call.agent_zero_voice, "Puck");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = KwararruConfig::load(file.path()).unwrap();
        assert_eq!(config.general.share_base_url, "http://localhost:5173/");
        assert_eq!(config.call.broadcast_category, "General");
    }
}
