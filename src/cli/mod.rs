//! CLI command implementations

pub mod init;
pub mod parse;
pub mod resolve;
pub mod run;
pub mod sessions;
pub mod ssh;
pub mod terminal;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use ptydeck::activity::ActivityStore;
use ptydeck::config::Config;
use ptydeck::provider::{ProviderResolver, ProviderStatusCache, SessionDiscoveryKind};
use ptydeck::pty::{NativePtyBackend, PtyRegistry, PtySpawner};
use ptydeck::session::{ClaudeProjectsDiscovery, SessionIsolation, SessionMap};
use ptydeck::shell::CommandResolver;

/// Load `path`, or the global config when none is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

/// Wire a spawner to the native PTY backend according to `config`.
pub fn build_spawner(config: &Config) -> Arc<PtySpawner> {
    let map = Arc::new(SessionMap::in_dir(
        &config.data_dir(),
        config.settings.session_map.max_entries,
    ));
    let mut isolation = SessionIsolation::new(map);
    if let Some(discovery) = ClaudeProjectsDiscovery::from_home() {
        isolation =
            isolation.with_discovery(SessionDiscoveryKind::ClaudeProjects, Arc::new(discovery));
    }

    let commands = Arc::new(CommandResolver::from_env());
    let status = Arc::new(ProviderStatusCache::new());
    status.refresh(&commands);

    let spawner = PtySpawner::new(
        Arc::new(NativePtyBackend::new()),
        Arc::new(PtyRegistry::new()),
        isolation,
    )
    .with_resolver(ProviderResolver::new(Arc::new(config.clone())))
    .with_status_source(status)
    .with_command_resolver(commands)
    .with_login_shell(config.settings.shell.clone())
    .with_ssh_program(config.settings.ssh_program.clone());

    Arc::new(spawner)
}

pub fn build_activity(config: &Config) -> Arc<ActivityStore> {
    Arc::new(ActivityStore::new(config.settings.activity.to_config()))
}
