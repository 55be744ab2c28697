//! Attaching the current terminal to a spawned PTY.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::info;

use ptydeck::activity::{task_key, ActivityStore};
use ptydeck::pty::{PtyEvent, PtyInfo, PtySpawner};
use ptydeck::PtyIdKind;

/// How an attached session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Exited(Option<u32>),
    Interrupted,
}

/// Receivers that must exist before the process starts, so no early
/// output is missed.
pub struct Taps {
    output: broadcast::Receiver<PtyEvent>,
    activity: broadcast::Receiver<PtyEvent>,
}

impl Taps {
    pub fn new(spawner: &PtySpawner) -> Self {
        Self {
            output: spawner.subscribe_events(),
            activity: spawner.subscribe_events(),
        }
    }
}

/// Stream output of `pty` to stdout and stdin lines back into it until the
/// process exits or Ctrl-C is pressed. Busy transitions are logged.
pub async fn attach(
    spawner: &Arc<PtySpawner>,
    activity: &Arc<ActivityStore>,
    pty: &PtyInfo,
    taps: Taps,
) -> Result<SessionEnd> {
    let Taps {
        output: mut events,
        activity: activity_events,
    } = taps;

    let key = task_key(&pty.id);
    let mut busy = activity.subscribe_busy(&key);
    let mut actions = activity.subscribe_actions(&key);
    busy.attach_source(activity_events, &[PtyIdKind::Main, PtyIdKind::Chat]);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PtyEvent::Data { id, generation, bytes }) => {
                    if id == pty.id && generation == pty.generation {
                        stdout.write_all(&bytes).await.context("Failed to write output")?;
                        stdout.flush().await.context("Failed to flush output")?;
                    }
                }
                Ok(PtyEvent::Exit { id, generation, code }) => {
                    if id == pty.id && generation == pty.generation {
                        return Ok(SessionEnd::Exited(code));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(pty_id = %pty.id, skipped, "Output lagged, some was dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(SessionEnd::Exited(None)),
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let input = format!("{line}\r");
                    let registry = spawner.registry().clone();
                    let id = pty.id.clone();
                    // PTY writes block when the child stops reading
                    tokio::task::spawn_blocking(move || registry.write(&id, input.as_bytes()))
                        .await
                        .context("Input writer panicked")?;
                }
                None => stdin_open = false,
            },
            Some(update) = busy.recv() => {
                info!(task = %update.key, busy = update.busy, signal = %update.signal, "Activity");
            }
            Some(update) = actions.recv() => {
                if let Some(action) = update.action {
                    info!(task = %update.key, %action, "Agent action");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                spawner.registry().kill(&pty.id);
                activity.process_exited(&pty.id);
                return Ok(SessionEnd::Interrupted);
            }
        }
    }
}
