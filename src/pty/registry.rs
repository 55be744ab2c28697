//! In-memory table of live pseudo-terminals.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::backend::PtyProcess;
use super::error::BenignPtyError;

pub const MIN_COLS: u16 = 2;
pub const MIN_ROWS: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyKind {
    Local,
    Ssh,
}

/// Process handle shared with callers, so blocking I/O on one PTY happens
/// outside the registry lock.
pub type SharedProcess = Arc<Mutex<Box<dyn PtyProcess>>>;

/// A running process and what is known about it.
pub struct PtyRecord {
    pub id: String,
    pub process: SharedProcess,
    pub pid: Option<u32>,
    pub cwd: Option<PathBuf>,
    /// Started without a shell; a shell is respawned in its place on exit
    pub is_direct: bool,
    pub kind: PtyKind,
    pub cols: u16,
    pub rows: u16,
    pub generation: u64,
}

impl PtyRecord {
    pub fn info(&self) -> PtyInfo {
        PtyInfo {
            id: self.id.clone(),
            cwd: self.cwd.clone(),
            is_direct: self.is_direct,
            kind: self.kind,
            cols: self.cols,
            rows: self.rows,
            generation: self.generation,
            pid: self.pid,
        }
    }
}

impl fmt::Debug for PtyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyRecord")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("cwd", &self.cwd)
            .field("is_direct", &self.is_direct)
            .field("kind", &self.kind)
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Read-only view of a [`PtyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PtyInfo {
    pub id: String,
    pub cwd: Option<PathBuf>,
    pub is_direct: bool,
    pub kind: PtyKind,
    pub cols: u16,
    pub rows: u16,
    pub generation: u64,
    pub pid: Option<u32>,
}

/// Live PTYs keyed by session id.
///
/// Nothing is persisted. After a restart, agents are reattached through
/// their own resume mechanism rather than through this table.
#[derive(Default)]
pub struct PtyRegistry {
    records: Mutex<HashMap<String, PtyRecord>>,
}

impl PtyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PtyRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `record`, returning whatever was registered under its id.
    ///
    /// Callers kill the previous process before respawning; a displaced
    /// record is handed back so it can still be torn down.
    pub fn insert(&self, record: PtyRecord) -> Option<PtyRecord> {
        let id = record.id.clone();
        let previous = self.lock().insert(id.clone(), record);
        if let Some(prev) = &previous {
            tracing::warn!(
                pty_id = %id,
                generation = prev.generation,
                "Replaced a live PTY without killing it first"
            );
        }
        previous
    }

    fn process(&self, id: &str) -> Option<SharedProcess> {
        self.lock().get(id).map(|r| r.process.clone())
    }

    /// Send input to `id`. Unknown ids are ignored.
    ///
    /// The write may block on a full PTY buffer; only this process's handle
    /// is held while it does.
    pub fn write(&self, id: &str, data: &[u8]) {
        let Some(process) = self.process(id) else {
            return;
        };
        let result = lock_process(&process).write(data);
        if let Err(e) = result {
            log_runtime_error(id, "write", &e);
        }
    }

    /// Resize `id`, clamped to the minimum size. Repeating the current size
    /// does not reach the process.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) {
        let cols = cols.max(MIN_COLS);
        let rows = rows.max(MIN_ROWS);

        let (process, generation) = {
            let records = self.lock();
            let Some(record) = records.get(id) else {
                return;
            };
            if record.cols == cols && record.rows == rows {
                return;
            }
            (record.process.clone(), record.generation)
        };

        let result = lock_process(&process).resize(cols, rows);
        match result {
            Ok(()) => {
                let mut records = self.lock();
                if let Some(record) = records.get_mut(id).filter(|r| r.generation == generation) {
                    record.cols = cols;
                    record.rows = rows;
                }
            }
            Err(e) => log_runtime_error(id, "resize", &e),
        }
    }

    /// Terminate and forget `id`. The record is removed even when the kill
    /// itself fails. Returns whether a record existed.
    pub fn kill(&self, id: &str) -> bool {
        let Some(record) = self.lock().remove(id) else {
            return false;
        };
        let result = lock_process(&record.process).kill();
        if let Err(e) = result {
            log_runtime_error(id, "kill", &e);
        }
        tracing::debug!(pty_id = %id, "Killed PTY");
        true
    }

    pub fn remove(&self, id: &str) -> Option<PtyRecord> {
        self.lock().remove(id)
    }

    /// Remove `id` only if it still belongs to `generation`.
    pub fn remove_if_generation(&self, id: &str, generation: u64) -> Option<PtyRecord> {
        let mut records = self.lock();
        if records.get(id)?.generation != generation {
            tracing::debug!(pty_id = %id, generation, "Ignoring exit of a replaced PTY");
            return None;
        }
        records.remove(id)
    }

    pub fn has_pty(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<PtyKind> {
        self.lock().get(id).map(|r| r.kind)
    }

    pub fn info(&self, id: &str) -> Option<PtyInfo> {
        self.lock().get(id).map(PtyRecord::info)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_process(process: &SharedProcess) -> MutexGuard<'_, Box<dyn PtyProcess>> {
    process.lock().unwrap_or_else(|e| e.into_inner())
}

fn log_runtime_error(id: &str, op: &str, err: &anyhow::Error) {
    match BenignPtyError::classify(err) {
        Some(kind) => {
            tracing::debug!(pty_id = %id, op, ?kind, "Ignoring error from exited PTY");
        }
        None => {
            tracing::warn!(pty_id = %id, op, error = %format!("{err:#}"), "PTY operation failed");
        }
    }
}
