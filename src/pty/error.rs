//! Spawn failures and the benign runtime errors of already-exited PTYs.

use std::fmt;
use std::io;

use serde::Serialize;

use super::env::KILL_SWITCH_ENV;

/// Which of the three spawn paths produced a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMode {
    /// Interactive shell, optionally launching an agent CLI inside it
    Shell,
    /// Agent CLI executed without a shell
    Direct,
    /// System `ssh` client
    Ssh,
}

impl SpawnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnMode::Shell => "shell",
            SpawnMode::Direct => "direct",
            SpawnMode::Ssh => "ssh",
        }
    }
}

impl fmt::Display for SpawnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("PTY spawning is disabled ({} is set)", KILL_SWITCH_ENV)]
    Disabled,

    #[error("No pseudo-terminal backend available: {0}")]
    BackendUnavailable(String),

    #[error("Failed to spawn {mode} process: {source:#}")]
    Spawn {
        mode: SpawnMode,
        #[source]
        source: anyhow::Error,
    },

    #[error("Shell spawn failed ({primary:#}) and the fallback shell failed too ({fallback:#})")]
    Fatal {
        primary: anyhow::Error,
        #[source]
        fallback: anyhow::Error,
    },
}

/// Errors a write or resize may hit when the child exited first.
///
/// These are expected while a pane shuts down and are absorbed; anything
/// else is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignPtyError {
    BadFileDescriptor,
    NotATty,
    IoctlFailed,
    ProcessExited,
}

const BENIGN_MESSAGES: &[(&str, BenignPtyError)] = &[
    ("bad file descriptor", BenignPtyError::BadFileDescriptor),
    ("ebadf", BenignPtyError::BadFileDescriptor),
    ("not a tty", BenignPtyError::NotATty),
    ("enotty", BenignPtyError::NotATty),
    ("inappropriate ioctl", BenignPtyError::NotATty),
    ("ioctl", BenignPtyError::IoctlFailed),
    ("no such process", BenignPtyError::ProcessExited),
    ("process exited", BenignPtyError::ProcessExited),
    ("broken pipe", BenignPtyError::ProcessExited),
];

impl BenignPtyError {
    /// Classify an I/O error by errno, then by kind.
    pub fn from_io(err: &io::Error) -> Option<Self> {
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            match code {
                libc::EBADF => return Some(Self::BadFileDescriptor),
                libc::ENOTTY => return Some(Self::NotATty),
                libc::EIO | libc::EINVAL => return Some(Self::IoctlFailed),
                libc::ESRCH => return Some(Self::ProcessExited),
                _ => {}
            }
        }

        match err.kind() {
            io::ErrorKind::BrokenPipe => Some(Self::ProcessExited),
            _ => None,
        }
    }

    /// Classify an error from a PTY backend.
    ///
    /// Every `io::Error` in the cause chain is checked first; backends that
    /// only carry text are matched against known messages.
    pub fn classify(err: &anyhow::Error) -> Option<Self> {
        if let Some(kind) = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<io::Error>())
            .find_map(Self::from_io)
        {
            return Some(kind);
        }

        let message = format!("{err:#}").to_ascii_lowercase();
        BENIGN_MESSAGES
            .iter()
            .find(|(needle, _)| message.contains(needle))
            .map(|(_, kind)| *kind)
    }
}
