//! Installation status of agent CLIs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::PROVIDERS;
use crate::shell::CommandResolver;

/// Whether a provider's CLI is installed and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub installed: bool,
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    pub fn installed_at(path: impl Into<PathBuf>) -> Self {
        Self {
            installed: true,
            path: Some(path.into()),
            checked_at: Some(Utc::now()),
        }
    }

    pub fn missing() -> Self {
        Self {
            installed: false,
            path: None,
            checked_at: Some(Utc::now()),
        }
    }
}

/// Read access to provider installation status.
pub trait ProviderStatusSource: Send + Sync {
    fn status(&self, provider_id: &str) -> Option<ProviderStatus>;
}

/// In-memory status table, filled by [`ProviderStatusCache::refresh`].
#[derive(Debug, Default)]
pub struct ProviderStatusCache {
    entries: RwLock<HashMap<String, ProviderStatus>>,
}

impl ProviderStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider_id: impl Into<String>, status: ProviderStatus) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(provider_id.into(), status);
    }

    /// Probe every built-in provider's CLI and record the result.
    pub fn refresh(&self, resolver: &CommandResolver) {
        for provider in PROVIDERS {
            let status = match resolver.resolve(provider.cli) {
                Some(path) => ProviderStatus::installed_at(path),
                None => ProviderStatus::missing(),
            };
            tracing::debug!(provider = provider.id, installed = status.installed, "Provider status");
            self.set(provider.id, status);
        }
    }

    pub fn all(&self) -> HashMap<String, ProviderStatus> {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProviderStatusSource for ProviderStatusCache {
    fn status(&self, provider_id: &str) -> Option<ProviderStatus> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider_id)
            .cloned()
    }
}
