use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl VersionInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            commit: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.commit {
            Some(commit) => write!(f, "{} ({commit})", self.version),
            None => f.write_str(&self.version),
        }
    }
}

/// Build information published by components, for whoever is handed the
/// registry (the `version` command, diagnostics).
#[derive(Clone, Default)]
pub struct VersionRegistry {
    entries: Arc<RwLock<BTreeMap<String, VersionInfo>>>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `info` under `component`, replacing any earlier entry.
    pub fn register(&self, component: impl Into<String>, info: VersionInfo) -> Registration {
        let component = component.into();
        self.entries.write().insert(component.clone(), info);
        Registration {
            component,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub fn unregister(&self, component: &str) -> Option<VersionInfo> {
        self.entries.write().remove(component)
    }

    pub fn get(&self, component: &str) -> Option<VersionInfo> {
        self.entries.read().get(component).cloned()
    }

    pub fn entries(&self) -> Vec<(String, VersionInfo)> {
        self.entries
            .read()
            .iter()
            .map(|(name, info)| (name.clone(), info.clone()))
            .collect()
    }
}

#[must_use = "keep the registration to be able to unregister"]
pub struct Registration {
    component: String,
    entries: Weak<RwLock<BTreeMap<String, VersionInfo>>>,
}

impl Registration {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn unregister(self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.write().remove(&self.component);
        }
    }
}
