//! Finding conversations an agent created without our knowledge.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Finds the most recent unclaimed conversation for a working directory.
pub trait SessionDiscovery: Send + Sync {
    fn discover(&self, cwd: &Path, exclude: &HashSet<String>) -> Option<String>;
}

/// Claude Code keeps one `<uuid>.jsonl` transcript per conversation under
/// `~/.claude/projects/<encoded cwd>/`.
#[derive(Debug, Clone)]
pub struct ClaudeProjectsDiscovery {
    root: PathBuf,
}

impl ClaudeProjectsDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discovery rooted at `~/.claude/projects`.
    pub fn from_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".claude").join("projects")))
    }

    pub fn project_dir(&self, cwd: &Path) -> PathBuf {
        self.root.join(encode_project_path(cwd))
    }
}

/// Claude's directory naming: every character other than ASCII letters,
/// digits and `-` becomes `-` (`/Users/me/app.v2` → `-Users-me-app-v2`).
pub fn encode_project_path(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

impl SessionDiscovery for ClaudeProjectsDiscovery {
    fn discover(&self, cwd: &Path, exclude: &HashSet<String>) -> Option<String> {
        let dir = self.project_dir(cwd);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "No project history to discover");
                return None;
            }
        };

        let mut candidates: Vec<(SystemTime, String)> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    return None;
                }
                let id = path.file_stem()?.to_str()?.to_string();
                if exclude.contains(&id) {
                    return None;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, id))
            })
            .collect();

        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        let found = candidates.into_iter().next().map(|(_, id)| id);
        if let Some(id) = &found {
            tracing::info!(cwd = %cwd.display(), session = %id, "Discovered unclaimed session");
        }
        found
    }
}
