//! Dependency map (§6.4): records the concrete commit resolved for each
//! remote (git) include reference, so repeated runs pin to the same
//! commit instead of re-resolving `latest`/branch tips.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BuilderError;

/// One pinned resolution: the reference as written in source, and the
/// commit it resolved to the first time it was read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PinnedCommit {
    pub commit_id: String,
}

/// The full set of pins, keyed by the include reference string exactly as
/// it appears in source (before any relative-path rewriting). A
/// `BTreeMap` keeps the serialized TOML output stable across runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DependencyMap {
    #[serde(flatten)]
    pins: BTreeMap<String, PinnedCommit>,
}

impl DependencyMap {
    pub fn new() -> Self {
        DependencyMap { pins: BTreeMap::new() }
    }

    pub fn load(path: &Path) -> Result<Self, BuilderError> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| BuilderError::User {
            location: crate::location::Location::at_line(path.display().to_string(), 0),
            message: format!("malformed dependency map: {}", e),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), BuilderError> {
        let text = toml::to_string_pretty(self).map_err(|e| BuilderError::User {
            location: crate::location::Location::at_line(path.display().to_string(), 0),
            message: format!("could not serialize dependency map: {}", e),
        })?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Look up a pin previously recorded for `reference`.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.pins.get(reference).map(|p| p.commit_id.as_str())
    }

    /// Record (or overwrite) the commit a reference resolved to.
    pub fn record(&mut self, reference: impl Into<String>, commit_id: impl Into<String>) {
        self.pins.insert(reference.into(), PinnedCommit { commit_id: commit_id.into() });
    }

    /// Merge another map's pins into this one, newer entries winning.
    /// Used when several includes of the same remote root are merged
    /// into one on-disk dependency file.
    pub fn merge(&mut self, other: &DependencyMap) {
        for (reference, pin) in &other.pins {
            self.pins.insert(reference.clone(), pin.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_and_looks_up_pins() {
        let mut map = DependencyMap::new();
        map.record("github:org/repo/file.bdr@latest", "abc123");
        assert_eq!(map.get("github:org/repo/file.bdr@latest"), Some("abc123"));
        assert_eq!(map.get("unknown"), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deps.toml");

        let mut map = DependencyMap::new();
        map.record("a", "commit-a");
        map.record("b", "commit-b");
        map.save(&path).unwrap();

        let loaded = DependencyMap::load(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn merge_prefers_other_map_entries() {
        let mut base = DependencyMap::new();
        base.record("a", "old");

        let mut incoming = DependencyMap::new();
        incoming.record("a", "new");
        incoming.record("b", "fresh");

        base.merge(&incoming);
        assert_eq!(base.get("a"), Some("new"));
        assert_eq!(base.get("b"), Some("fresh"));
    }
}
