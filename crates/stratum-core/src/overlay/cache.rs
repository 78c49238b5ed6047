//! The overlay cache: current snapshot plus the immutable base layer.
//!
//! Readers pin an `Arc<OverlaySnapshot>` with a single atomic load and resolve
//! against that immutable view. The writer builds a complete replacement and
//! publishes it with one pointer swap, so no reader can ever pair environment
//! defaults and config sets from different fetch cycles.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use super::snapshot::OverlaySnapshot;
use crate::foundation::BaseConfig;

/// Whether a distributed store backs the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// No store configured: static dev defaults only, never refreshed.
    Static,
    /// Store configured: snapshots come from the store and may be refreshed.
    Store,
}

/// Holds the current overlay snapshot and the static base layer.
pub struct OverlayCache {
    current: ArcSwap<OverlaySnapshot>,
    base: BaseConfig,
    mode: SourceMode,
}

impl OverlayCache {
    /// Creates a cache with an initial snapshot.
    pub fn new(base: BaseConfig, initial: OverlaySnapshot, mode: SourceMode) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            base,
            mode,
        }
    }

    /// Returns the current snapshot.
    ///
    /// Never blocks on a concurrent [`replace`](Self::replace).
    pub fn get(&self) -> Arc<OverlaySnapshot> {
        self.current.load_full()
    }

    /// Publishes a new snapshot, replacing the current one wholesale.
    ///
    /// Readers still holding the previous snapshot keep using it until they
    /// drop their reference.
    pub fn replace(&self, snapshot: OverlaySnapshot) {
        let revision = snapshot.revision();
        let previous = self.current.swap(Arc::new(snapshot));
        debug!(
            previous_revision = previous.revision(),
            revision, "Published overlay snapshot"
        );
    }

    /// Publishes `snapshot` unless the current one has a higher revision.
    ///
    /// The revision check and the swap happen as one atomic step, so two
    /// concurrent writers can never move the revision backwards. On refusal
    /// the current revision is returned.
    pub fn replace_if_newer(&self, snapshot: OverlaySnapshot) -> Result<(), u64> {
        let revision = snapshot.revision();
        let next = Arc::new(snapshot);
        let mut current = self.current.load();
        loop {
            if revision < current.revision() {
                return Err(current.revision());
            }
            let previous = self.current.compare_and_swap(&*current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &*current) {
                debug!(
                    previous_revision = previous.revision(),
                    revision, "Published overlay snapshot"
                );
                return Ok(());
            }
            current = previous;
        }
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn is_store_backed(&self) -> bool {
        self.mode == SourceMode::Store
    }
}

impl std::fmt::Debug for OverlayCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayCache")
            .field("revision", &self.current.load().revision())
            .field("base_attributes", &self.base.len())
            .field("mode", &self.mode)
            .finish()
    }
}
