//! Immutable overlay snapshots.

use std::collections::HashMap;

use crate::foundation::{AttributeMap, AttributeValue};

/// Where a snapshot's layers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Derived from process-local dev parameters; carries no config sets.
    Static,
    /// Read from the distributed store.
    Store,
}

/// An internally consistent pairing of environment defaults and config sets.
///
/// Both layers always come from the same fetch cycle. A snapshot is never
/// mutated after construction; refreshes build a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySnapshot {
    env_defaults: AttributeMap,
    config_sets: HashMap<String, AttributeMap>,
    revision: u64,
    origin: SnapshotOrigin,
}

impl OverlaySnapshot {
    /// Creates a store-backed snapshot read at `revision`.
    pub fn new(
        env_defaults: AttributeMap,
        config_sets: HashMap<String, AttributeMap>,
        revision: u64,
    ) -> Self {
        Self {
            env_defaults,
            config_sets,
            revision,
            origin: SnapshotOrigin::Store,
        }
    }

    /// Creates a static snapshot with no config sets.
    pub fn from_static(env_defaults: AttributeMap) -> Self {
        Self {
            env_defaults,
            config_sets: HashMap::new(),
            revision: 0,
            origin: SnapshotOrigin::Static,
        }
    }

    /// Creates an empty static snapshot.
    pub fn empty() -> Self {
        Self::from_static(AttributeMap::new())
    }

    pub fn env_defaults(&self) -> &AttributeMap {
        &self.env_defaults
    }

    /// Looks up an environment default.
    pub fn env_default(&self, name: &str) -> Option<&AttributeValue> {
        self.env_defaults.get(name)
    }

    pub fn config_sets(&self) -> &HashMap<String, AttributeMap> {
        &self.config_sets
    }

    /// Returns the attributes of one config set.
    pub fn config_set(&self, set_id: &str) -> Option<&AttributeMap> {
        self.config_sets.get(set_id)
    }

    /// Looks up an attribute inside one config set.
    pub fn set_value(&self, set_id: &str, name: &str) -> Option<&AttributeValue> {
        self.config_sets.get(set_id).and_then(|set| set.get(name))
    }

    /// Store revision the snapshot was read at; zero for static snapshots.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }
}

impl Default for OverlaySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
