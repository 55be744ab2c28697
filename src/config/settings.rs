//! Settings configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityConfig;
use crate::session::DEFAULT_MAX_ENTRIES;

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Login shell for generic spawns. Falls back to `$SHELL` (or `%COMSPEC%`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Where the session identity map lives (defaults to ~/.ptydeck/)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Secure-shell client used for remote terminals
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,

    /// Busy-indicator timing
    #[serde(default)]
    pub activity: ActivitySettings,

    #[serde(default)]
    pub session_map: SessionMapSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySettings {
    /// Minimum time a task stays busy once it turned busy
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Silence after which a busy task with only neutral output is cleared
    #[serde(default = "default_soft_clear_ms")]
    pub soft_clear_ms: u64,
}

impl ActivitySettings {
    pub fn to_config(self) -> ActivityConfig {
        ActivityConfig {
            hold: Duration::from_millis(self.hold_ms),
            soft_clear: Duration::from_millis(self.soft_clear_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMapSettings {
    /// Entries kept before the least recently updated are pruned
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_hold_ms() -> u64 {
    1200
}

fn default_soft_clear_ms() -> u64 {
    8000
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: None,
            data_dir: None,
            activity: ActivitySettings::default(),
            session_map: SessionMapSettings::default(),
            ssh_program: default_ssh_program(),
        }
    }
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            hold_ms: default_hold_ms(),
            soft_clear_ms: default_soft_clear_ms(),
        }
    }
}

impl Default for SessionMapSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}
