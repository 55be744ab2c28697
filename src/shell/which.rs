//! Memoized executable lookup.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::args::Platform;

const DEFAULT_PATHEXT: &str = ".COM;.EXE;.BAT;.CMD;.PS1";

/// Resolves command names to absolute executable paths.
///
/// Results (including misses) are cached per literal command string for the
/// lifetime of the resolver; executables rarely move while sessions run.
#[derive(Debug)]
pub struct CommandResolver {
    path_var: Option<OsString>,
    platform: Platform,
    path_ext: Vec<String>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl CommandResolver {
    /// A resolver using the process `PATH` (and `PATHEXT` on Windows).
    pub fn from_env() -> Self {
        let path_ext = std::env::var("PATHEXT").unwrap_or_else(|_| DEFAULT_PATHEXT.to_string());
        Self::with_path(std::env::var_os("PATH"), Platform::current(), &path_ext)
    }

    pub fn with_path(path_var: Option<OsString>, platform: Platform, path_ext: &str) -> Self {
        Self {
            path_var,
            platform,
            path_ext: path_ext
                .split(';')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `command` to an executable path, probing the filesystem only
    /// the first time a given string is seen.
    pub fn resolve(&self, command: &str) -> Option<PathBuf> {
        let command = command.trim();
        if command.is_empty() {
            return None;
        }

        if let Some(hit) = self.lock().get(command) {
            return hit.clone();
        }

        let found = self.probe(command);
        tracing::debug!(command, found = ?found, "Resolved command path");
        self.lock().insert(command.to_string(), found.clone());
        found
    }

    /// Number of cached lookups.
    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<PathBuf>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn has_separator(&self, command: &str) -> bool {
        command.contains('/') || (self.platform == Platform::Windows && command.contains('\\'))
    }

    fn probe(&self, command: &str) -> Option<PathBuf> {
        if self.has_separator(command) || Path::new(command).is_absolute() {
            return self.check_candidate(Path::new(command));
        }

        let path_var = self.path_var.as_ref()?;
        std::env::split_paths(path_var)
            .filter(|dir| !dir.as_os_str().is_empty())
            .find_map(|dir| self.check_candidate(&dir.join(command)))
    }

    fn check_candidate(&self, candidate: &Path) -> Option<PathBuf> {
        if is_executable(candidate) {
            return Some(candidate.to_path_buf());
        }
        if self.platform == Platform::Windows && candidate.extension().is_none() {
            for ext in &self.path_ext {
                let mut with_ext = candidate.as_os_str().to_owned();
                with_ext.push(ext);
                let with_ext = PathBuf::from(with_ext);
                if is_executable(&with_ext) {
                    return Some(with_ext);
                }
            }
        }
        None
    }
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
