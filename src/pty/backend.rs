//! Pseudo-terminal capability.
//!
//! [`PtyBackend`] is the seam between the spawner and the OS. The native
//! implementation uses `portable-pty`; tests substitute a recording fake.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::broadcast;

/// Everything a backend needs to start one process.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub id: String,
    /// Distinguishes successive processes started under the same id
    pub generation: u64,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// The complete environment; nothing is inherited
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

/// Output and lifecycle notifications from running processes.
#[derive(Debug, Clone, PartialEq)]
pub enum PtyEvent {
    Data {
        id: String,
        generation: u64,
        bytes: Arc<[u8]>,
    },
    Exit {
        id: String,
        generation: u64,
        code: Option<u32>,
    },
}

impl PtyEvent {
    pub fn id(&self) -> &str {
        match self {
            PtyEvent::Data { id, .. } | PtyEvent::Exit { id, .. } => id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            PtyEvent::Data { generation, .. } | PtyEvent::Exit { generation, .. } => *generation,
        }
    }
}

pub type PtyEventSender = broadcast::Sender<PtyEvent>;

/// Handle to one running process.
pub trait PtyProcess: Send {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;
    fn kill(&mut self) -> Result<()>;
    fn pid(&self) -> Option<u32>;
}

pub trait PtyBackend: Send + Sync {
    /// Err with a reason when no pseudo-terminal can be opened on this host.
    fn check_available(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Start `request`, publishing its output and exit on `events`.
    fn spawn(&self, request: SpawnRequest, events: PtyEventSender) -> Result<Box<dyn PtyProcess>>;
}

/// `portable-pty` backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtyBackend;

impl NativePtyBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PtyBackend for NativePtyBackend {
    fn check_available(&self) -> std::result::Result<(), String> {
        #[cfg(unix)]
        if !std::path::Path::new("/dev/ptmx").exists() {
            return Err("/dev/ptmx is missing".to_string());
        }
        Ok(())
    }

    fn spawn(&self, request: SpawnRequest, events: PtyEventSender) -> Result<Box<dyn PtyProcess>> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&request.program);
        cmd.args(&request.args);
        cmd.env_clear();
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &request.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", request.program))?;
        // The child holds its own slave handle; ours would keep the PTY open after exit
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let writer = pair.master.take_writer().context("Failed to take PTY writer")?;
        let killer = child.clone_killer();
        let pid = child.process_id();

        let SpawnRequest { id, generation, .. } = request;

        let data_tx = events.clone();
        let data_id = id.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        // No receivers is fine; output is only observed when someone listens
                        let _ = data_tx.send(PtyEvent::Data {
                            id: data_id.clone(),
                            generation,
                            bytes: Arc::from(&buf[..n]),
                        });
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!(pty_id = %data_id, error = %e, "PTY reader closed");
                        break;
                    }
                }
            }
        });

        std::thread::spawn(move || {
            let code = match child.wait() {
                Ok(status) => Some(status.exit_code()),
                Err(e) => {
                    tracing::debug!(pty_id = %id, error = %e, "Failed to wait for PTY child");
                    None
                }
            };
            tracing::debug!(pty_id = %id, ?code, "PTY child exited");
            let _ = events.send(PtyEvent::Exit { id, generation, code });
        });

        Ok(Box::new(NativePtyProcess {
            master: pair.master,
            writer,
            killer,
            pid,
        }))
    }
}

struct NativePtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl PtyProcess for NativePtyProcess {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).context("Failed to write to PTY")?;
        self.writer.flush().context("Failed to flush PTY")?;
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    fn kill(&mut self) -> Result<()> {
        self.killer.kill().context("Failed to kill PTY child")
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
