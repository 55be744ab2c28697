//! Resolve command implementation

use std::sync::Arc;

use anyhow::{bail, Result};

use ptydeck::config::Config;
use ptydeck::provider::{build_args, BuildArgsOptions, ProviderResolver};
use ptydeck::shell::CommandResolver;

/// Print the effective command configuration for `provider`
pub fn resolve_command(config: Config, provider: &str) -> Result<()> {
    let resolver = ProviderResolver::new(Arc::new(config));
    let Some(resolved) = resolver.resolve(provider) else {
        bail!("Unknown provider: {}", provider);
    };

    let args = build_args(&BuildArgsOptions {
        resolved: &resolved,
        resume: false,
        session_isolated: false,
        auto_approve: false,
        initial_prompt: None,
    });
    let executable = CommandResolver::from_env().resolve(&resolved.cli);

    let output = serde_json::json!({
        "resolved": resolved,
        "args": args,
        "executable": executable,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
