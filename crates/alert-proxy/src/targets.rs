//! Target Registry: a read-mostly, copy-on-write view over discovered
//! publishing targets. Readers take a snapshot `Arc` and never hold a lock
//! across I/O; writers (reload) swap the whole snapshot atomically.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::model::Target;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read target registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse target registry file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Read-through view over the current set of targets. Cloning the registry
/// is cheap (it clones an `Arc`); every reader sees a consistent snapshot
/// for the duration of its request even if a reload happens concurrently.
#[derive(Clone)]
pub struct TargetRegistry {
    snapshot: Arc<RwLock<Arc<Vec<Target>>>>,
}

impl TargetRegistry {
    #[must_use]
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Arc::new(targets))),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Load targets from a YAML file of `Vec<Target>`.
    pub fn load_from_file(path: &str) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_string(),
            source,
        })?;
        let targets: Vec<Target> =
            serde_yaml::from_str(&contents).map_err(|source| RegistryError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(Self::new(targets))
    }

    /// Replace the registry's snapshot file from a YAML file, without
    /// holding any lock across the file read.
    pub fn reload_from_file(&self, path: &str) -> Result<(), RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_string(),
            source,
        })?;
        let targets: Vec<Target> =
            serde_yaml::from_str(&contents).map_err(|source| RegistryError::Parse {
                path: path.to_string(),
                source,
            })?;
        self.replace(targets);
        Ok(())
    }

    pub fn replace(&self, targets: Vec<Target>) {
        let new_snapshot = Arc::new(targets);
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = new_snapshot;
        }
    }

    /// A point-in-time snapshot of every enabled target.
    #[must_use]
    pub fn enabled_targets(&self) -> Vec<Target> {
        self.all_targets()
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn all_targets(&self) -> Arc<Vec<Target>> {
        self.snapshot
            .read()
            .map(|g| Arc::clone(&g))
            .unwrap_or_else(|_| Arc::new(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, enabled: bool) -> Target {
        Target {
            name: name.to_string(),
            target_type: "webhook".to_string(),
            url: format!("http://example.invalid/{name}"),
            enabled,
            auth: None,
        }
    }

    #[test]
    fn enabled_targets_filters_disabled() {
        let registry = TargetRegistry::new(vec![target("a", true), target("b", false)]);
        let enabled = registry.enabled_targets();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "a");
    }

    #[test]
    fn replace_swaps_snapshot_atomically() {
        let registry = TargetRegistry::new(vec![target("a", true)]);
        assert_eq!(registry.all_targets().len(), 1);
        registry.replace(vec![target("a", true), target("b", true)]);
        assert_eq!(registry.all_targets().len(), 2);
    }

    #[test]
    fn empty_registry_has_no_targets() {
        let registry = TargetRegistry::empty();
        assert!(registry.enabled_targets().is_empty());
    }
}
