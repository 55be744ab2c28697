//! ptydeck - terminals for coding agents
//!
//! ptydeck runs agent CLIs (Claude Code, Codex, Gemini, ...) inside
//! pseudo-terminals and keeps track of what each of them is doing.
//!
//! ## Building blocks
//!
//! 1. **Spawning**: [`pty::PtySpawner`] starts an agent through the user's
//!    login shell, directly without a shell, or on a remote host over SSH.
//!    Provider command lines come from [`provider::ProviderResolver`], and
//!    [`session::SessionIsolation`] gives every terminal its own agent
//!    conversation.
//!
//! 2. **Activity**: [`activity::classify`] reads terminal output and
//!    [`activity::ActivityStore`] turns those readings into a steady busy
//!    indicator per task.

pub mod activity;
pub mod config;
pub mod domain;
pub mod provider;
pub mod pty;
pub mod session;
pub mod shell;
pub mod telemetry;

pub use domain::*;
