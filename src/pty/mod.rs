//! Pseudo-terminal lifecycle: spawning, the live registry and the backend
//! seam.
//!
//! A [`PtySpawner`] turns a spawn request into a program, argv and a
//! minimal environment, starts it through a [`PtyBackend`] and records it
//! in the [`PtyRegistry`]. Output and exits flow out as [`PtyEvent`]s.

mod backend;
mod env;
mod error;
mod registry;
mod spawner;

pub use backend::{NativePtyBackend, PtyBackend, PtyEvent, PtyEventSender, PtyProcess, SpawnRequest};
pub use env::{
    auth_passthrough, build_base_env, fallback_shell, namespaced_vars, HostEnv,
    AGENT_AUTH_ENV_ALLOWLIST, ENV_NAMESPACE_PREFIX, KILL_SWITCH_ENV, TERM_PROGRAM,
};
pub use error::{BenignPtyError, SpawnError, SpawnMode};
pub use registry::{PtyInfo, PtyKind, PtyRecord, PtyRegistry, SharedProcess, MIN_COLS, MIN_ROWS};
pub use spawner::{
    DirectSpawnExited, DirectStartOptions, PtySpawner, SshStartOptions, StartOptions,
};
