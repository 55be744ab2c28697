use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which terminal of a task a PTY belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyIdKind {
    /// The task's primary agent terminal
    Main,
    /// A secondary conversation terminal
    Chat,
}

impl PtyIdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PtyIdKind::Main => "main",
            PtyIdKind::Chat => "chat",
        }
    }
}

impl fmt::Display for PtyIdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured session identifier: `{provider}-{kind}-{suffix}`.
///
/// The string form is the key of the PTY registry, the activity store and
/// the persisted session map. `suffix` is the owning task's (or
/// conversation's) identifier and may itself contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PtyId {
    pub provider: String,
    pub kind: PtyIdKind,
    pub suffix: String,
}

impl PtyId {
    pub fn new(provider: impl Into<String>, kind: PtyIdKind, suffix: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            suffix: suffix.into(),
        }
    }

    pub fn main(provider: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self::new(provider, PtyIdKind::Main, task_id)
    }

    pub fn chat(provider: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self::new(provider, PtyIdKind::Chat, conversation_id)
    }

    /// Parse the string form. Returns `None` unless provider and suffix are
    /// both non-empty and the kind marker is `main` or `chat`.
    pub fn parse(id: &str) -> Option<Self> {
        let (pos, kind, marker_len) = [("-main-", PtyIdKind::Main), ("-chat-", PtyIdKind::Chat)]
            .into_iter()
            .filter_map(|(marker, kind)| id.find(marker).map(|pos| (pos, kind, marker.len())))
            .min_by_key(|(pos, _, _)| *pos)?;

        let provider = &id[..pos];
        let suffix = &id[pos + marker_len..];
        if provider.is_empty() || suffix.is_empty() {
            return None;
        }

        Some(Self::new(provider, kind, suffix))
    }
}

impl fmt::Display for PtyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.provider, self.kind, self.suffix)
    }
}

impl FromStr for PtyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid PTY id: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_main_id() {
        let id = PtyId::parse("claude-main-task-123").unwrap();
        assert_eq!(id.provider, "claude");
        assert_eq!(id.kind, PtyIdKind::Main);
        assert_eq!(id.suffix, "task-123");
    }

    #[test]
    fn test_parse_chat_id() {
        let id = PtyId::parse("codex-chat-conv_9").unwrap();
        assert_eq!(id.kind, PtyIdKind::Chat);
        assert_eq!(id.suffix, "conv_9");
    }

    #[test]
    fn test_first_marker_wins() {
        let id = PtyId::parse("claude-chat-x-main-y").unwrap();
        assert_eq!(id.kind, PtyIdKind::Chat);
        assert_eq!(id.suffix, "x-main-y");
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(PtyId::parse("claude").is_none());
        assert!(PtyId::parse("claude-main-").is_none());
        assert!(PtyId::parse("-main-abc").is_none());
        assert!(PtyId::parse("claude-other-abc").is_none());
    }

    #[test]
    fn test_display_round_trips() {
        let id = PtyId::main("gemini", "t1");
        assert_eq!(id.to_string(), "gemini-main-t1");
        assert_eq!(PtyId::parse(&id.to_string()), Some(id));
    }
}
