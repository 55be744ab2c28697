//! Configuration file I/O operations

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Config;

impl Config {
    /// Get the global config directory path (~/.ptydeck/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ptydeck")
    }

    /// Get the global config file path (~/.ptydeck/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load global configuration from ~/.ptydeck/config.toml
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::global_config_path())
    }

    /// Save configuration with an exclusive lock and an atomic rename.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        let _lock = acquire_lock(path)?;
        write_atomic(path, &content)
    }

    /// Write the default configuration to `path`.
    ///
    /// Returns `false` without touching anything when a file already exists
    /// and `force` is not set.
    pub fn init(path: &Path, force: bool) -> Result<bool> {
        let _lock = acquire_lock(path)?;

        // Re-check under the lock, another process may have created it
        if path.exists() && !force {
            return Ok(false);
        }

        write_atomic(path, DEFAULT_CONFIG)?;
        Ok(true)
    }
}

/// Default configuration written by `ptydeck init`
pub const DEFAULT_CONFIG: &str = r#"# ptydeck configuration
# ======================

[settings]
# Login shell for generic spawns (defaults to $SHELL, or %COMSPEC% on Windows)
# shell = "/bin/zsh"

# Where pty-session-map.json is stored (defaults to ~/.ptydeck)
# data_dir = "/path/to/data"

# Secure-shell client used by `ptydeck ssh`
ssh_program = "ssh"

[settings.activity]
# A task stays busy for at least this long once it turned busy
hold_ms = 1200
# Busy tasks that only print neutral output are cleared after this long
soft_clear_ms = 8000

[settings.session_map]
max_entries = 2000

# ============================================================================
# PROVIDERS - per-agent command overrides
# ============================================================================
#
# Available options (all optional):
#   cli                 - Executable name or absolute path
#   resume_flag         - Flag that resumes the last conversation
#   default_args        - Arguments added to every launch
#   auto_approve_flag   - Flag used when auto-approve is requested
#   initial_prompt_flag - Flag preceding the initial prompt ("" = positional)
#   extra_args          - Arguments appended after everything else
#   env                 - Extra environment variables
#
# [provider.claude]
# cli = "/opt/homebrew/bin/claude"
# extra_args = "--model opus"
#
# [provider.claude.env]
# CLAUDE_CODE_MAX_OUTPUT_TOKENS = "32000"
"#;

/// Lock file kept next to the config, separate from it so the rename
/// never replaces a locked file.
fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    let lock_path = path.with_extension("toml.lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire config lock")?;

    Ok(lock_file)
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("toml.tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

    temp_file
        .write_all(content.as_bytes())
        .with_context(|| "Failed to write config content")?;

    temp_file
        .sync_all()
        .with_context(|| "Failed to sync config file")?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename config file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_init_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(Config::init(&path, false).unwrap());
        std::fs::write(&path, "[settings]\nssh_program = \"/usr/bin/ssh\"\n").unwrap();

        assert!(!Config::init(&path, false).unwrap());
        assert_eq!(Config::load_from(&path).unwrap().settings.ssh_program, "/usr/bin/ssh");

        assert!(Config::init(&path, true).unwrap());
        assert_eq!(Config::load_from(&path).unwrap().settings.ssh_program, "ssh");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.settings.shell = Some("/bin/fish".into());
        config.provider.insert(
            "codex".into(),
            crate::provider::ProviderCustomConfig {
                cli: Some("codex-nightly".into()),
                ..Default::default()
            },
        );
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[settings\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
