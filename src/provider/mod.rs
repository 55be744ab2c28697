//! Agent CLI providers.
//!
//! A provider is one agent CLI (Claude Code, Codex, Gemini, ...). This module
//! holds the built-in provider table, merges it with the user's per-provider
//! overrides, assembles argv vectors and tracks which CLIs are installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use ptydeck::provider::{build_args, BuildArgsOptions, ProviderResolver};
//!
//! let resolver = ProviderResolver::builtin();
//! let resolved = resolver.resolve("claude").unwrap();
//! let args = build_args(&BuildArgsOptions {
//!     resolved: &resolved,
//!     resume: false,
//!     session_isolated: false,
//!     auto_approve: true,
//!     initial_prompt: Some("fix the failing test"),
//! });
//! ```

mod registry;
mod resolver;
mod status;

pub use registry::{
    provider_by_id, provider_for_cli, ProviderDefinition, SessionDiscoveryKind, PROVIDERS,
};
pub use resolver::{
    build_args, is_valid_env_key, BuildArgsOptions, ProviderCustomConfig, ProviderResolver,
    ProviderSettings, ResolvedProviderCommand,
};
pub use status::{ProviderStatus, ProviderStatusCache, ProviderStatusSource};
