//! SSH command implementation

use anyhow::Result;

use ptydeck::config::Config;
use ptydeck::pty::SshStartOptions;
use ptydeck::PtyId;

use super::terminal::{attach, SessionEnd, Taps};
use super::{build_activity, build_spawner};

/// Open a remote terminal and attach the current terminal to it
pub async fn ssh_command(
    config: &Config,
    target: String,
    task: Option<String>,
    init: Option<String>,
    ssh_args: Vec<String>,
) -> Result<SessionEnd> {
    let task = task.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let id = PtyId::main("ssh", task).to_string();

    let spawner = build_spawner(config);
    let activity = build_activity(config);
    tokio::spawn(spawner.clone().run_exit_pump());
    tokio::spawn(activity.clone().run_timers());

    let taps = Taps::new(&spawner);
    let pty = spawner.start_ssh(SshStartOptions {
        id,
        target,
        ssh_args,
        remote_init_command: init,
        env: std::env::vars().collect(),
        ..Default::default()
    })?;

    attach(&spawner, &activity, &pty, taps).await
}
