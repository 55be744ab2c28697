//! Merge built-in provider definitions with user overrides.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::registry::{provider_by_id, ProviderDefinition};
use crate::shell::parse_shell_args;

/// Per-provider overrides stored in the user's settings.
///
/// Every field is optional; a present value (even an empty string) replaces
/// the built-in default, with two exceptions: a blank `cli` and a blank
/// `extra_args` are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCustomConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_args: Option<String>,
    /// Extra environment for the agent. Only identifier-shaped keys with
    /// string values survive resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, serde_json::Value>>,
}

/// Source of per-provider custom configuration.
pub trait ProviderSettings: Send + Sync {
    fn custom_config(&self, provider_id: &str) -> Option<ProviderCustomConfig>;
}

impl ProviderSettings for HashMap<String, ProviderCustomConfig> {
    fn custom_config(&self, provider_id: &str) -> Option<ProviderCustomConfig> {
        self.get(provider_id).cloned()
    }
}

/// The effective command configuration for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProviderCommand {
    pub provider: &'static ProviderDefinition,
    pub cli: String,
    pub resume_flag: Option<String>,
    pub default_args: Option<Vec<String>>,
    pub auto_approve_flag: Option<String>,
    pub initial_prompt_flag: Option<String>,
    pub extra_args: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
}

impl ResolvedProviderCommand {
    /// Whether the user replaced the built-in CLI name.
    pub fn has_custom_cli(&self) -> bool {
        self.cli != self.provider.cli
    }
}

static ENV_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Whether `key` is acceptable as an environment variable name.
pub fn is_valid_env_key(key: &str) -> bool {
    ENV_KEY.is_match(key)
}

fn sanitize_env(
    provider_id: &str,
    env: Option<HashMap<String, serde_json::Value>>,
) -> Option<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (key, value) in env.unwrap_or_default() {
        match value {
            serde_json::Value::String(v) if is_valid_env_key(&key) => {
                out.insert(key, v);
            }
            _ => {
                tracing::debug!(provider = provider_id, key, "Ignoring invalid custom env entry");
            }
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Resolves provider ids to effective command configurations.
#[derive(Clone)]
pub struct ProviderResolver {
    settings: Arc<dyn ProviderSettings>,
}

impl ProviderResolver {
    pub fn new(settings: Arc<dyn ProviderSettings>) -> Self {
        Self { settings }
    }

    /// A resolver with no user overrides.
    pub fn builtin() -> Self {
        Self::new(Arc::new(HashMap::<String, ProviderCustomConfig>::new()))
    }

    /// Resolve `provider_id`, or `None` if it is not a known provider.
    pub fn resolve(&self, provider_id: &str) -> Option<ResolvedProviderCommand> {
        let provider = provider_by_id(provider_id)?;
        let custom = self.settings.custom_config(provider_id).unwrap_or_default();

        let cli = custom
            .cli
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(provider.cli)
            .to_string();

        let default_args = match custom.default_args {
            Some(args) => Some(parse_shell_args(&args)),
            None => provider.default_args.map(parse_shell_args),
        };

        let extra_args = custom
            .extra_args
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_shell_args(&s));

        Some(ResolvedProviderCommand {
            provider,
            cli,
            resume_flag: custom
                .resume_flag
                .or_else(|| provider.resume_flag.map(String::from)),
            default_args,
            auto_approve_flag: custom
                .auto_approve_flag
                .or_else(|| provider.auto_approve_flag.map(String::from)),
            initial_prompt_flag: custom
                .initial_prompt_flag
                .or_else(|| provider.initial_prompt_flag.map(String::from)),
            extra_args,
            env: sanitize_env(provider_id, custom.env),
        })
    }
}

/// Inputs for [`build_args`].
#[derive(Debug, Clone, Copy)]
pub struct BuildArgsOptions<'a> {
    pub resolved: &'a ResolvedProviderCommand,
    /// Reopen the previous conversation
    pub resume: bool,
    /// Session-isolation arguments were already emitted for this spawn
    pub session_isolated: bool,
    pub auto_approve: bool,
    pub initial_prompt: Option<&'a str>,
}

/// Assemble the CLI argument vector.
///
/// Order is fixed: resume flag, default args, auto-approve flag, initial
/// prompt, extra args. Some CLIs treat their first positional argument as a
/// subcommand, so the order must not change.
pub fn build_args(opts: &BuildArgsOptions<'_>) -> Vec<String> {
    let resolved = opts.resolved;
    let mut args = Vec::new();

    if opts.resume && !opts.session_isolated {
        if let Some(flag) = &resolved.resume_flag {
            args.extend(parse_shell_args(flag));
        }
    }

    if let Some(defaults) = &resolved.default_args {
        args.extend(defaults.iter().cloned());
    }

    if opts.auto_approve {
        if let Some(flag) = &resolved.auto_approve_flag {
            args.extend(parse_shell_args(flag));
        }
    }

    let prompt = opts.initial_prompt.filter(|p| !p.trim().is_empty());
    if let (Some(prompt), Some(flag)) = (prompt, &resolved.initial_prompt_flag) {
        if !resolved.provider.use_keystroke_injection {
            args.extend(parse_shell_args(flag));
            args.push(prompt.to_string());
        }
    }

    if let Some(extra) = &resolved.extra_args {
        args.extend(extra.iter().cloned());
    }

    args
}
