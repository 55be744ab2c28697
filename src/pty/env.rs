//! Environments handed to spawned processes.
//!
//! Spawned processes never inherit the host environment wholesale. Each
//! spawn starts from [`build_base_env`] and adds only what its mode allows:
//! the agent credential allowlist for direct and SSH spawns, and
//! `PTYDECK_`-prefixed caller variables for SSH.

use std::collections::BTreeMap;

use crate::shell::Platform;

/// Set to any value other than `0`/`false` to refuse every spawn.
pub const KILL_SWITCH_ENV: &str = "PTYDECK_DISABLE_PTY";

/// Prefix of caller variables forwarded to remote hosts.
pub const ENV_NAMESPACE_PREFIX: &str = "PTYDECK_";

pub const TERM_PROGRAM: &str = "ptydeck";

const DEFAULT_POSIX_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Host variables agent CLIs need to authenticate or reach their APIs.
pub static AGENT_AUTH_ENV_ALLOWLIST: &[&str] = &[
    // Anthropic
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_AUTH_TOKEN",
    "ANTHROPIC_BASE_URL",
    "ANTHROPIC_MODEL",
    "CLAUDE_CODE_USE_BEDROCK",
    "CLAUDE_CODE_USE_VERTEX",
    // OpenAI
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_ORG_ID",
    "CODEX_HOME",
    // Google
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_LOCATION",
    "GOOGLE_GENAI_USE_VERTEXAI",
    // AWS
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_PROFILE",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    // Azure
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_ENDPOINT",
    // Other providers
    "DASHSCOPE_API_KEY",
    "MOONSHOT_API_KEY",
    "OPENROUTER_API_KEY",
    "CURSOR_API_KEY",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "AMP_API_KEY",
    // Network
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "all_proxy",
    "SSL_CERT_FILE",
    "NODE_EXTRA_CA_CERTS",
    "SSH_AUTH_SOCK",
];

const WINDOWS_ESSENTIALS: &[&str] = &[
    "SystemRoot",
    "SystemDrive",
    "windir",
    "COMSPEC",
    "PATHEXT",
    "USERPROFILE",
    "APPDATA",
    "LOCALAPPDATA",
    "ProgramData",
    "ProgramFiles",
    "TEMP",
    "TMP",
];

const POSIX_ESSENTIALS: &[&str] = &["TMPDIR", "LOGNAME", "XDG_RUNTIME_DIR"];

/// Snapshot of the host process environment.
///
/// Captured once when the spawner is built so every spawn sees the same
/// view; tests construct one from literal pairs.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    vars: BTreeMap<String, String>,
}

impl HostEnv {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of `key`. Windows names are matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = self.vars.get(key).or_else(|| {
            if cfg!(windows) {
                self.vars
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            } else {
                None
            }
        })?;
        (!value.is_empty()).then_some(value.as_str())
    }

    pub fn kill_switch_enabled(&self) -> bool {
        self.get(KILL_SWITCH_ENV)
            .is_some_and(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false"))
    }

    /// The user's login shell.
    pub fn default_shell(&self, platform: Platform) -> String {
        match platform {
            Platform::Windows => self.get("COMSPEC").unwrap_or("cmd.exe").to_string(),
            Platform::Posix => self.get("SHELL").map(String::from).unwrap_or_else(|| {
                if cfg!(target_os = "macos") {
                    "/bin/zsh".to_string()
                } else {
                    "/bin/bash".to_string()
                }
            }),
        }
    }
}

/// Shell used when the requested shell cannot be started.
pub fn fallback_shell(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "cmd.exe",
        Platform::Posix => "/bin/sh",
    }
}

/// The minimal environment every spawned process receives.
pub fn build_base_env(host: &HostEnv, shell: &str, platform: Platform) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let mut set = |key: &str, value: &str| {
        env.insert(key.to_string(), value.to_string());
    };

    set("TERM", "xterm-256color");
    set("COLORTERM", "truecolor");
    set("TERM_PROGRAM", TERM_PROGRAM);
    set("SHELL", shell);
    set("LANG", host.get("LANG").unwrap_or("en_US.UTF-8"));

    let home = host
        .get("HOME")
        .map(String::from)
        .or_else(|| dirs::home_dir().map(|p| p.to_string_lossy().into_owned()));
    if let Some(home) = home {
        set("HOME", &home);
    }
    if let Some(user) = host.get("USER").or_else(|| host.get("USERNAME")) {
        set("USER", user);
    }

    match platform {
        Platform::Posix => {
            set("PATH", host.get("PATH").unwrap_or(DEFAULT_POSIX_PATH));
            for key in POSIX_ESSENTIALS {
                if let Some(value) = host.get(key) {
                    set(key, value);
                }
            }
        }
        Platform::Windows => {
            if let Some(path) = host.get("PATH") {
                set("PATH", path);
            }
            for key in WINDOWS_ESSENTIALS {
                if let Some(value) = host.get(key) {
                    set(key, value);
                }
            }
        }
    }

    env
}

/// Allowlisted credential variables present on the host.
pub fn auth_passthrough(host: &HostEnv) -> BTreeMap<String, String> {
    AGENT_AUTH_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| host.get(key).map(|v| (key.to_string(), v.to_string())))
        .collect()
}

/// Caller variables carrying the application prefix.
pub fn namespaced_vars(vars: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    vars.iter()
        .filter(|(k, _)| k.starts_with(ENV_NAMESPACE_PREFIX) && k.len() > ENV_NAMESPACE_PREFIX.len())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostEnv {
        HostEnv::from_pairs([
            ("HOME", "/home/dev"),
            ("USER", "dev"),
            ("PATH", "/opt/bin:/usr/bin"),
            ("TMPDIR", "/tmp/dev"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", ""),
            ("PYTHONHOME", "/bundled/python"),
            ("SECRET_TOKEN", "nope"),
        ])
    }

    #[test]
    fn test_base_env_is_minimal() {
        let env = build_base_env(&host(), "/bin/zsh", Platform::Posix);
        assert_eq!(env["TERM"], "xterm-256color");
        assert_eq!(env["COLORTERM"], "truecolor");
        assert_eq!(env["SHELL"], "/bin/zsh");
        assert_eq!(env["HOME"], "/home/dev");
        assert_eq!(env["PATH"], "/opt/bin:/usr/bin");
        assert_eq!(env["LANG"], "en_US.UTF-8");
        assert_eq!(env["TMPDIR"], "/tmp/dev");
        assert!(!env.contains_key("PYTHONHOME"));
        assert!(!env.contains_key("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_auth_passthrough_uses_allowlist() {
        let auth = auth_passthrough(&host());
        assert_eq!(auth.len(), 1);
        assert_eq!(auth["ANTHROPIC_API_KEY"], "sk-ant");
    }

    #[test]
    fn test_namespaced_vars() {
        let vars: BTreeMap<String, String> = [
            ("PTYDECK_TASK", "t1"),
            ("PTYDECK_", "empty-name"),
            ("AWS_SECRET_ACCESS_KEY", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let out = namespaced_vars(&vars);
        assert_eq!(out.len(), 1);
        assert_eq!(out["PTYDECK_TASK"], "t1");
    }

    #[test]
    fn test_kill_switch() {
        assert!(!HostEnv::default().kill_switch_enabled());
        assert!(HostEnv::from_pairs([(KILL_SWITCH_ENV, "1")]).kill_switch_enabled());
        assert!(!HostEnv::from_pairs([(KILL_SWITCH_ENV, "false")]).kill_switch_enabled());
        assert!(!HostEnv::from_pairs([(KILL_SWITCH_ENV, "")]).kill_switch_enabled());
    }

    #[test]
    fn test_default_shell_prefers_host() {
        let host = HostEnv::from_pairs([("SHELL", "/usr/bin/fish")]);
        assert_eq!(host.default_shell(Platform::Posix), "/usr/bin/fish");
        assert_eq!(HostEnv::default().default_shell(Platform::Windows), "cmd.exe");
    }
}
