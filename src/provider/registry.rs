//! Built-in table of agent CLIs.

use serde::Serialize;

/// How orphaned conversations of a provider can be found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDiscoveryKind {
    /// The provider keeps no discoverable history
    None,
    /// `~/.claude/projects/<encoded cwd>/<uuid>.jsonl`
    ClaudeProjects,
}

/// Static description of one agent CLI.
///
/// Flag strings are tokenized with the shell-argument parser when the argv
/// is assembled, so a flag such as `"resume --last"` may expand to several
/// arguments. `initial_prompt_flag: Some("")` means the prompt is passed as
/// a bare positional argument; `None` means the CLI cannot take a prompt on
/// its command line.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub cli: &'static str,
    pub resume_flag: Option<&'static str>,
    pub default_args: Option<&'static str>,
    pub auto_approve_flag: Option<&'static str>,
    pub initial_prompt_flag: Option<&'static str>,
    /// Flag that pins a new conversation to a caller-chosen UUID
    pub session_id_flag: Option<&'static str>,
    /// Flag that reopens a conversation by UUID
    pub session_resume_flag: &'static str,
    /// Prompt is typed into the TUI after startup instead of passed as argv
    pub use_keystroke_injection: bool,
    pub discovery: SessionDiscoveryKind,
}

impl ProviderDefinition {
    const fn base(id: &'static str, name: &'static str, cli: &'static str) -> Self {
        Self {
            id,
            name,
            cli,
            resume_flag: None,
            default_args: None,
            auto_approve_flag: None,
            initial_prompt_flag: None,
            session_id_flag: None,
            session_resume_flag: "--resume",
            use_keystroke_injection: false,
            discovery: SessionDiscoveryKind::None,
        }
    }

    /// Whether this provider supports per-terminal session isolation.
    pub fn supports_session_isolation(&self) -> bool {
        self.session_id_flag.is_some()
    }
}

pub static PROVIDERS: &[ProviderDefinition] = &[
    ProviderDefinition {
        resume_flag: Some("-c -r"),
        auto_approve_flag: Some("--dangerously-skip-permissions"),
        initial_prompt_flag: Some(""),
        session_id_flag: Some("--session-id"),
        discovery: SessionDiscoveryKind::ClaudeProjects,
        ..ProviderDefinition::base("claude", "Claude Code", "claude")
    },
    ProviderDefinition {
        resume_flag: Some("resume --last"),
        auto_approve_flag: Some("--dangerously-bypass-approvals-and-sandbox"),
        initial_prompt_flag: Some(""),
        ..ProviderDefinition::base("codex", "Codex", "codex")
    },
    ProviderDefinition {
        resume_flag: Some("--resume"),
        auto_approve_flag: Some("--yolo"),
        initial_prompt_flag: Some("-i"),
        ..ProviderDefinition::base("gemini", "Gemini CLI", "gemini")
    },
    ProviderDefinition {
        auto_approve_flag: Some("--yolo"),
        initial_prompt_flag: Some("-i"),
        ..ProviderDefinition::base("qwen", "Qwen Code", "qwen")
    },
    ProviderDefinition {
        resume_flag: Some("resume"),
        auto_approve_flag: Some("-f"),
        initial_prompt_flag: Some(""),
        ..ProviderDefinition::base("cursor", "Cursor Agent", "cursor-agent")
    },
    ProviderDefinition {
        resume_flag: Some("--continue"),
        auto_approve_flag: Some("--allow-all-tools"),
        initial_prompt_flag: Some("-i"),
        ..ProviderDefinition::base("copilot", "GitHub Copilot CLI", "copilot")
    },
    ProviderDefinition {
        auto_approve_flag: Some("--dangerously-allow-all"),
        use_keystroke_injection: true,
        ..ProviderDefinition::base("amp", "Amp", "amp")
    },
    ProviderDefinition {
        use_keystroke_injection: true,
        ..ProviderDefinition::base("opencode", "OpenCode", "opencode")
    },
    ProviderDefinition {
        default_args: Some("session"),
        use_keystroke_injection: true,
        ..ProviderDefinition::base("goose", "Goose", "goose")
    },
    ProviderDefinition {
        resume_flag: Some("--continue"),
        auto_approve_flag: Some("--yolo"),
        use_keystroke_injection: true,
        ..ProviderDefinition::base("kimi", "Kimi CLI", "kimi")
    },
];

/// Look up a provider by id.
pub fn provider_by_id(id: &str) -> Option<&'static ProviderDefinition> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// Find the provider whose CLI name matches an executable basename.
///
/// Windows launcher extensions are ignored so `claude.cmd` matches `claude`.
pub fn provider_for_cli(basename: &str) -> Option<&'static ProviderDefinition> {
    let name = basename.to_ascii_lowercase();
    let stem = [".exe", ".cmd", ".bat", ".ps1"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(&name);
    PROVIDERS.iter().find(|p| p.cli == stem)
}
