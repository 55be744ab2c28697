//! Run command implementation

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use ptydeck::config::Config;
use ptydeck::provider::provider_by_id;
use ptydeck::pty::{DirectSpawnExited, DirectStartOptions, StartOptions};
use ptydeck::PtyId;

use super::terminal::{attach, SessionEnd, Taps};
use super::{build_activity, build_spawner};

/// How long to wait for the exit pump to announce a direct-spawn exit
const DIRECT_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Options for `ptydeck run`
#[derive(Debug, Default)]
pub struct RunOptions {
    pub provider: String,
    pub task: String,
    pub chat: bool,
    pub cwd: Option<PathBuf>,
    pub resume: bool,
    pub auto_approve: bool,
    pub prompt: Option<String>,
    /// Always go through the login shell
    pub shell: bool,
    /// Start a shell in place of the agent once it exits
    pub keep_open: bool,
    pub cols: u16,
    pub rows: u16,
}

/// Start an agent in a PTY and attach the current terminal to it
pub async fn run_command(config: &Config, opts: RunOptions) -> Result<SessionEnd> {
    let Some(provider) = provider_by_id(&opts.provider) else {
        bail!("Unknown provider: {}", opts.provider);
    };

    let cwd = match &opts.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };
    let id = if opts.chat {
        PtyId::chat(provider.id, &opts.task)
    } else {
        PtyId::main(provider.id, &opts.task)
    }
    .to_string();

    let spawner = build_spawner(config);
    let activity = build_activity(config);
    tokio::spawn(spawner.clone().run_exit_pump());
    tokio::spawn(activity.clone().run_timers());
    let mut direct_exits = spawner.subscribe_direct_exits();

    let taps = Taps::new(&spawner);
    let direct = if opts.shell {
        None
    } else {
        spawner.start_direct(DirectStartOptions {
            id: id.clone(),
            provider_id: provider.id.to_string(),
            cwd: cwd.clone(),
            cols: opts.cols,
            rows: opts.rows,
            auto_approve: opts.auto_approve,
            initial_prompt: opts.prompt.clone(),
            resume: opts.resume,
            ..Default::default()
        })?
    };

    let pty = match direct {
        Some(pty) => pty,
        None => {
            info!(provider = provider.id, "Starting through the login shell");
            spawner.start(StartOptions {
                id: id.clone(),
                cwd: Some(cwd.clone()),
                shell: Some(provider.cli.to_string()),
                cols: opts.cols,
                rows: opts.rows,
                auto_approve: opts.auto_approve,
                initial_prompt: opts.prompt.clone(),
                skip_resume: !opts.resume,
                ..Default::default()
            })?
        }
    };

    let end = attach(&spawner, &activity, &pty, taps).await?;
    if !opts.keep_open || !pty.is_direct || end == SessionEnd::Interrupted {
        return Ok(end);
    }

    let exited = tokio::time::timeout(DIRECT_EXIT_GRACE, async {
        loop {
            match direct_exits.recv().await {
                Ok(exit) if exit.id == id => return Some(exit),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten();
    let Some(DirectSpawnExited { cwd, code, .. }) = exited else {
        warn!(pty_id = %id, "Direct spawn exit was not announced");
        return Ok(end);
    };

    info!(pty_id = %id, ?code, "Agent exited, opening a shell in its place");
    let taps = Taps::new(&spawner);
    let shell = spawner.start(StartOptions {
        id,
        cwd: Some(cwd),
        cols: opts.cols,
        rows: opts.rows,
        ..Default::default()
    })?;
    attach(&spawner, &activity, &shell, taps).await
}
