//! Configuration loading and management

mod io;
mod settings;

pub use settings::{ActivitySettings, SessionMapSettings, Settings};

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderCustomConfig, ProviderSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Per-provider command overrides, keyed by provider id
    #[serde(default)]
    pub provider: HashMap<String, ProviderCustomConfig>,
}

impl Config {
    /// Directory holding the session identity map.
    pub fn data_dir(&self) -> PathBuf {
        self.settings
            .data_dir
            .clone()
            .unwrap_or_else(Self::global_config_dir)
    }
}

impl ProviderSettings for Config {
    fn custom_config(&self, provider_id: &str) -> Option<ProviderCustomConfig> {
        self.provider.get(provider_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.settings.activity.hold_ms, 1200);
        assert_eq!(config.settings.activity.soft_clear_ms, 8000);
        assert_eq!(config.settings.session_map.max_entries, 2000);
        assert_eq!(config.settings.ssh_program, "ssh");
    }

    #[test]
    fn test_provider_overrides() {
        let config: Config = toml::from_str(
            r#"
[settings]
shell = "/bin/zsh"

[settings.activity]
hold_ms = 500

[provider.claude]
cli = "/opt/claude/bin/claude"
extra_args = "--model opus"

[provider.claude.env]
CLAUDE_CONFIG_DIR = "/tmp/claude"
"#,
        )
        .unwrap();

        assert_eq!(config.settings.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(config.settings.activity.hold_ms, 500);
        assert_eq!(config.settings.activity.soft_clear_ms, 8000);

        let claude = config.custom_config("claude").unwrap();
        assert_eq!(claude.cli.as_deref(), Some("/opt/claude/bin/claude"));
        assert_eq!(claude.extra_args.as_deref(), Some("--model opus"));
        let env = claude.env.unwrap();
        assert_eq!(env["CLAUDE_CONFIG_DIR"], serde_json::json!("/tmp/claude"));
        assert!(config.custom_config("codex").is_none());
    }

    #[test]
    fn test_activity_settings_convert_to_durations() {
        let activity = ActivitySettings {
            hold_ms: 10,
            soft_clear_ms: 20,
        };
        let config = activity.to_config();
        assert_eq!(config.hold.as_millis(), 10);
        assert_eq!(config.soft_clear.as_millis(), 20);
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.settings.data_dir = Some(PathBuf::from("/var/lib/ptydeck"));
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/ptydeck"));
    }
}
