//! Overlay layer: immutable snapshots and the atomically swapped cache.

pub mod cache;
pub mod snapshot;

pub use cache::{OverlayCache, SourceMode};
pub use snapshot::{OverlaySnapshot, SnapshotOrigin};
