//! Decide between starting and resuming an agent conversation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::discovery::SessionDiscovery;
use super::map::SessionMap;
use super::identity::deterministic_uuid;
use crate::domain::{PtyId, PtyIdKind};
use crate::provider::{ProviderDefinition, SessionDiscoveryKind};

/// Assigns each terminal its own agent conversation.
///
/// Backed by the persistent [`SessionMap`]; discovery strategies are
/// registered per provider capability.
#[derive(Clone)]
pub struct SessionIsolation {
    map: Arc<SessionMap>,
    discoveries: HashMap<SessionDiscoveryKind, Arc<dyn SessionDiscovery>>,
}

impl SessionIsolation {
    pub fn new(map: Arc<SessionMap>) -> Self {
        Self {
            map,
            discoveries: HashMap::new(),
        }
    }

    pub fn with_discovery(
        mut self,
        kind: SessionDiscoveryKind,
        discovery: Arc<dyn SessionDiscovery>,
    ) -> Self {
        self.discoveries.insert(kind, discovery);
        self
    }

    pub fn map(&self) -> &Arc<SessionMap> {
        &self.map
    }

    /// Append session-isolation arguments to `args`.
    ///
    /// Returns `true` when arguments were appended; the caller then must not
    /// add the provider's generic resume flag. The first matching rule wins:
    ///
    /// 1. a UUID is recorded for `session_id` → resume it;
    /// 2. chat terminal → start with a UUID derived from the suffix;
    /// 3. resume while other sessions of this provider share `cwd` → adopt an
    ///    unclaimed on-disk conversation, else the derived UUID;
    /// 4. first spawn → start with the derived UUID so later multi-session
    ///    transitions have a stable identity;
    /// 5. otherwise nothing is appended.
    pub fn apply(
        &self,
        args: &mut Vec<String>,
        provider: &ProviderDefinition,
        session_id: &str,
        cwd: &Path,
        is_resume: bool,
    ) -> bool {
        let Some(session_flag) = provider.session_id_flag else {
            return false;
        };
        let Some(parsed) = PtyId::parse(session_id) else {
            return false;
        };

        if let Some(uuid) = self.map.get(session_id) {
            tracing::debug!(session_id, %uuid, "Resuming recorded session");
            args.push(provider.session_resume_flag.to_string());
            args.push(uuid);
            return true;
        }

        if parsed.kind == PtyIdKind::Chat {
            let uuid = deterministic_uuid(&parsed.suffix);
            self.start_with(args, session_flag, session_id, &uuid, cwd);
            return true;
        }

        if is_resume {
            let others = self.map.other_sessions(provider.id, cwd, session_id);
            if others.is_empty() {
                return false;
            }

            let uuid = self
                .discover(provider, cwd)
                .unwrap_or_else(|| deterministic_uuid(&parsed.suffix));
            tracing::info!(
                session_id,
                %uuid,
                others = others.len(),
                "Main terminal joining multi-session mode"
            );
            self.start_with(args, session_flag, session_id, &uuid, cwd);
            return true;
        }

        let uuid = deterministic_uuid(&parsed.suffix);
        self.start_with(args, session_flag, session_id, &uuid, cwd);
        true
    }

    fn discover(&self, provider: &ProviderDefinition, cwd: &Path) -> Option<String> {
        let discovery = self.discoveries.get(&provider.discovery)?;
        discovery.discover(cwd, &self.map.claimed_uuids())
    }

    fn start_with(
        &self,
        args: &mut Vec<String>,
        session_flag: &str,
        session_id: &str,
        uuid: &str,
        cwd: &Path,
    ) {
        args.push(session_flag.to_string());
        args.push(uuid.to_string());
        self.map.set(session_id, uuid, cwd);
    }
}
