//! Persistent PTY id → agent session UUID map.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::PtyId;

/// Default number of entries kept before the least recently updated are pruned.
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

/// File name of the map inside the data directory.
pub const SESSION_MAP_FILE: &str = "pty-session-map.json";

#[derive(Debug, thiserror::Error)]
pub enum SessionMapError {
    #[error("Failed to access session map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session map: {0}")]
    Json(#[from] serde_json::Error),
}

/// One persisted session assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub uuid: String,
    pub cwd: String,
    /// Milliseconds since the epoch of the last write, used for pruning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Fields written by other versions, kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parsed contents of the map file.
#[derive(Debug)]
struct Stored {
    entries: BTreeMap<String, SessionEntry>,
    /// Top-level keys that are not session entries, written back as-is
    unknown: serde_json::Map<String, Value>,
    /// False when an unreadable file is still in place and must not be replaced
    writable: bool,
}

impl Stored {
    fn empty(writable: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            unknown: serde_json::Map::new(),
            writable,
        }
    }

    fn from_object(object: serde_json::Map<String, Value>) -> Self {
        let mut stored = Self::empty(true);
        for (key, value) in object {
            let entry = value
                .is_object()
                .then(|| serde_json::from_value::<SessionEntry>(value.clone()).ok())
                .flatten();
            match entry {
                Some(entry) => {
                    stored.entries.insert(key, entry);
                }
                None => {
                    stored.unknown.insert(key, value);
                }
            }
        }
        stored
    }

    fn to_json(&self) -> Result<Value, SessionMapError> {
        let mut object = self.unknown.clone();
        for (key, entry) in &self.entries {
            object.insert(key.clone(), serde_json::to_value(entry)?);
        }
        Ok(Value::Object(object))
    }
}

/// Lazily loaded, write-through JSON map of session assignments.
///
/// The file is read on first access and the whole map is rewritten on each
/// [`set`](Self::set), under the same lock that guards the in-memory map.
/// Write failures are logged; the in-memory map stays authoritative for the
/// rest of the process lifetime.
#[derive(Debug)]
pub struct SessionMap {
    path: PathBuf,
    max_entries: usize,
    stored: Mutex<Option<Stored>>,
}

impl SessionMap {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_max_entries(path, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            stored: Mutex::new(None),
        }
    }

    /// Map stored in `data_dir`.
    pub fn in_dir(data_dir: &Path, max_entries: usize) -> Self {
        Self::with_max_entries(data_dir.join(SESSION_MAP_FILE), max_entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn loaded(&self) -> LoadedGuard<'_> {
        let mut guard = self.stored.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(load_stored(&self.path));
        }
        LoadedGuard(guard)
    }

    fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<String, SessionEntry>) -> R) -> R {
        let mut guard = self.loaded();
        f(&guard.stored().entries)
    }

    /// UUID recorded for `session_id`.
    pub fn get(&self, session_id: &str) -> Option<String> {
        self.with_entries(|entries| entries.get(session_id).map(|e| e.uuid.clone()))
    }

    pub fn entry(&self, session_id: &str) -> Option<SessionEntry> {
        self.with_entries(|entries| entries.get(session_id).cloned())
    }

    /// Record `uuid` for `session_id` and rewrite the file.
    ///
    /// The lock is held through the write so concurrent callers land on
    /// disk in the order they updated memory.
    pub fn set(&self, session_id: &str, uuid: &str, cwd: &Path) {
        let mut guard = self.loaded();
        let stored = guard.stored();

        let extra = stored
            .entries
            .remove(session_id)
            .map(|e| e.extra)
            .unwrap_or_default();
        stored.entries.insert(
            session_id.to_string(),
            SessionEntry {
                uuid: uuid.to_string(),
                cwd: cwd.to_string_lossy().into_owned(),
                updated_at: Some(chrono::Utc::now().timestamp_millis()),
                extra,
            },
        );
        prune(&mut stored.entries, self.max_entries, session_id);

        if !stored.writable {
            tracing::warn!(
                path = %self.path.display(),
                "Session map file is unreadable, keeping assignment in memory only"
            );
            return;
        }
        if let Err(e) = write_stored(&self.path, stored) {
            tracing::warn!(error = %e, "Failed to persist session map");
        }
    }

    /// Session ids of `provider` recorded for `cwd`, other than `except`.
    pub fn other_sessions(&self, provider: &str, cwd: &Path, except: &str) -> Vec<String> {
        let cwd = cwd.to_string_lossy();
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|(id, entry)| {
                    id.as_str() != except
                        && entry.cwd == cwd
                        && PtyId::parse(id).is_some_and(|p| p.provider == provider)
                })
                .map(|(id, _)| id.clone())
                .collect()
        })
    }

    /// Every UUID currently assigned to some session.
    pub fn claimed_uuids(&self) -> HashSet<String> {
        self.with_entries(|entries| entries.values().map(|e| e.uuid.clone()).collect())
    }

    pub fn entries(&self) -> BTreeMap<String, SessionEntry> {
        self.with_entries(|entries| entries.clone())
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock guard over a map that has been loaded.
struct LoadedGuard<'a>(MutexGuard<'a, Option<Stored>>);

impl LoadedGuard<'_> {
    fn stored(&mut self) -> &mut Stored {
        self.0.get_or_insert_with(|| Stored::empty(true))
    }
}

fn load_stored(path: &Path) -> Stored {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Stored::empty(true),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read session map");
            return Stored::empty(false);
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(object)) => Stored::from_object(object),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Session map is not a JSON object");
            set_aside(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse session map");
            set_aside(path)
        }
    }
}

/// Move an unusable map file to `<name>.bak` so the next write cannot
/// destroy it. If the move fails the file stays and writes are disabled.
fn set_aside(path: &Path) -> Stored {
    let backup = backup_path(path);
    match fs::rename(path, &backup) {
        Ok(()) => {
            tracing::warn!(backup = %backup.display(), "Moved unusable session map aside");
            Stored::empty(true)
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to move unusable session map aside, not overwriting it"
            );
            Stored::empty(false)
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("json.bak")
}

fn write_stored(path: &Path, stored: &Stored) -> Result<(), SessionMapError> {
    let io_err = |source| SessionMapError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_string_pretty(&stored.to_json()?)?;

    // Temp file + rename so a crash never leaves a truncated map. The name is
    // unique so another process writing the same map cannot share it.
    let temp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    let written = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_err(e));
    }

    Ok(())
}

/// Drop the least recently updated entries until at most `max` remain,
/// never dropping `keep`.
fn prune(entries: &mut BTreeMap<String, SessionEntry>, max: usize, keep: &str) {
    if entries.len() <= max {
        return;
    }

    let mut by_age: Vec<(Option<i64>, String)> = entries
        .iter()
        .filter(|(id, _)| id.as_str() != keep)
        .map(|(id, e)| (e.updated_at, id.clone()))
        .collect();
    by_age.sort();

    let excess = entries.len() - max;
    for (_, id) in by_age.into_iter().take(excess) {
        tracing::debug!(session_id = %id, "Pruning session map entry");
        entries.remove(&id);
    }
}
