//! Session identity: which agent conversation belongs to which terminal.
//!
//! Agent CLIs that accept a caller-chosen conversation id (Claude's
//! `--session-id`) let several terminals run the same agent in one working
//! directory without sharing history. The assignments are persisted so a
//! restarted app resumes each terminal's own conversation.

mod discovery;
mod isolation;
mod map;
mod identity;

pub use discovery::{encode_project_path, ClaudeProjectsDiscovery, SessionDiscovery};
pub use isolation::SessionIsolation;
pub use map::{SessionEntry, SessionMap, SessionMapError, DEFAULT_MAX_ENTRIES, SESSION_MAP_FILE};
pub use identity::deterministic_uuid;
