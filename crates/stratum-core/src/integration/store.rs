//! The store client interface.
//!
//! A store is a hierarchical key-value namespace that can be read once and
//! watched for changes. Implementations live in `stratum-store`; timeouts and
//! connection handling are theirs, surfaced here as
//! [`OverlayError::StoreUnavailable`](crate::OverlayError::StoreUnavailable).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::foundation::OverlayResult;

/// A raw key-value entry as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Full hierarchical key, e.g. `/config/prod/FEATURE_FLAGS`.
    pub key: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Revision at which this entry was last modified.
    pub mod_revision: u64,
}

impl StoreEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, mod_revision: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mod_revision,
        }
    }
}

/// The result of a read-once fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// Store revision the read was served at.
    pub revision: u64,
    /// Every entry under the requested prefixes.
    pub entries: Vec<StoreEntry>,
}

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Put,
    Delete,
}

/// A change notification from a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// The key that changed.
    pub key: String,
    pub kind: ChangeKind,
    /// Store revision of the change.
    pub revision: u64,
}

/// Stream of change notifications.
///
/// Ends when the underlying subscription closes; an `Err` item means the
/// subscription broke and should be re-established.
pub type WatchStream = BoxStream<'static, OverlayResult<StoreEvent>>;

/// A watchable key-value store client.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Returns a human-readable name for logging.
    fn name(&self) -> &str;

    /// Reads every entry under the given key prefixes in one consistent read.
    async fn fetch_entries(&self, prefixes: &[String]) -> OverlayResult<FetchResponse>;

    /// Subscribes to changes under the given key prefixes.
    async fn watch(&self, prefixes: &[String]) -> OverlayResult<WatchStream>;

    /// Whether [`watch`](Self::watch) delivers push notifications.
    ///
    /// Clients returning `false` are polled periodically instead.
    fn supports_watch(&self) -> bool {
        true
    }
}
