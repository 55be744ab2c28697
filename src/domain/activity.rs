use serde::{Deserialize, Serialize};

/// Discrete signal produced by classifying one chunk of terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    /// The agent is working (spinner, "esc to interrupt", ...)
    Busy,
    /// The agent paused on a prompt that needs the user
    AwaitingInput,
    /// The agent is back at its input prompt
    Idle,
    /// Nothing recognizable in this chunk
    #[default]
    Neutral,
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivitySignal::Busy => write!(f, "busy"),
            ActivitySignal::AwaitingInput => write!(f, "awaiting_input"),
            ActivitySignal::Idle => write!(f, "idle"),
            ActivitySignal::Neutral => write!(f, "neutral"),
        }
    }
}

/// Result of classifying a chunk: the signal plus an optional description
/// of what the agent is currently doing (e.g. `Bash(cargo test)`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub signal: ActivitySignal,
    pub action: Option<String>,
}

impl Classification {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn new(signal: ActivitySignal) -> Self {
        Self { signal, action: None }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}
