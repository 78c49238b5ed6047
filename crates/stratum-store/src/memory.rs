//! In-process watchable store.
//!
//! `MemoryStore` keeps entries in a sorted map with a monotonically increasing
//! revision, and fans change notifications out to watchers over a broadcast
//! channel. It backs tests and single-process deployments, and can simulate
//! outages with [`MemoryStore::set_available`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use stratum_core::{
    ChangeKind, FetchResponse, OverlayError, OverlayResult, StoreClient, StoreEntry, StoreEvent,
    WatchStream,
};

/// Capacity of the notification channel per watcher.
const NOTIFY_CAPACITY: usize = 256;

/// Message fanned out to watchers.
#[derive(Debug, Clone)]
enum Notice {
    Change(StoreEvent),
    /// The store went away; open watch streams fail and close.
    Disconnect,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, (Vec<u8>, u64)>,
    revision: u64,
    available: bool,
}

/// An in-memory [`StoreClient`].
///
/// # Example
///
/// ```rust
/// use stratum_store::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.put("/config/dev/DEBUG", "true");
/// assert_eq!(store.revision(), 1);
/// ```
pub struct MemoryStore {
    name: String,
    state: Mutex<State>,
    notify: broadcast::Sender<Notice>,
    watch_supported: bool,
}

impl MemoryStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            name: "memory".to_string(),
            state: Mutex::new(State {
                available: true,
                ..State::default()
            }),
            notify,
            watch_supported: true,
        }
    }

    /// Sets the name reported in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes the store report no push support, so consumers poll it.
    pub fn without_watch(mut self) -> Self {
        self.watch_supported = false;
        self
    }

    /// Stores `value` under `key` and returns the new revision.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> u64 {
        let key = key.into();
        let revision = {
            let mut state = self.state.lock();
            state.revision += 1;
            let revision = state.revision;
            state.entries.insert(key.clone(), (value.into(), revision));
            revision
        };
        self.publish(key, ChangeKind::Put, revision);
        revision
    }

    /// Stores a JSON document under `key` and returns the new revision.
    pub fn put_json(&self, key: impl Into<String>, value: &Value) -> u64 {
        self.put(key, value.to_string())
    }

    /// Removes `key`; returns the new revision, or `None` if it was absent.
    pub fn delete(&self, key: &str) -> Option<u64> {
        let revision = {
            let mut state = self.state.lock();
            state.entries.remove(key)?;
            state.revision += 1;
            state.revision
        };
        self.publish(key.to_string(), ChangeKind::Delete, revision);
        Some(revision)
    }

    /// Marks the store reachable or unreachable.
    ///
    /// While unavailable, fetches and new watches fail with
    /// `StoreUnavailable`, and open watch streams yield one error and end.
    pub fn set_available(&self, available: bool) {
        let was = std::mem::replace(&mut self.state.lock().available, available);
        if was && !available {
            warn!(store = %self.name, "Store marked unavailable");
            let _ = self.notify.send(Notice::Disconnect);
        } else if !was && available {
            debug!(store = %self.name, "Store marked available");
        }
    }

    /// Current store revision.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Number of open watch streams.
    pub fn watcher_count(&self) -> usize {
        self.notify.receiver_count()
    }

    fn publish(&self, key: String, kind: ChangeKind, revision: u64) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.notify.send(Notice::Change(StoreEvent {
            key,
            kind,
            revision,
        }));
    }

    fn ensure_available(&self) -> OverlayResult<()> {
        if self.state.lock().available {
            Ok(())
        } else {
            Err(OverlayError::unavailable(format!(
                "store '{}' is unavailable",
                self.name
            )))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("entries", &state.entries.len())
            .field("revision", &state.revision)
            .field("available", &state.available)
            .finish()
    }
}

fn matches_any(key: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| key.starts_with(p.as_str()))
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_entries(&self, prefixes: &[String]) -> OverlayResult<FetchResponse> {
        let state = self.state.lock();
        if !state.available {
            return Err(OverlayError::unavailable(format!(
                "store '{}' is unavailable",
                self.name
            )));
        }
        let entries = state
            .entries
            .iter()
            .filter(|(key, _)| matches_any(key, prefixes))
            .map(|(key, (value, rev))| StoreEntry::new(key.clone(), value.clone(), *rev))
            .collect();
        Ok(FetchResponse {
            revision: state.revision,
            entries,
        })
    }

    async fn watch(&self, prefixes: &[String]) -> OverlayResult<WatchStream> {
        self.ensure_available()?;
        let receiver = self.notify.subscribe();
        let prefixes = prefixes.to_vec();

        let stream = futures::stream::unfold(Some(receiver), move |receiver| {
            let prefixes = prefixes.clone();
            async move {
                let mut receiver = receiver?;
                loop {
                    match receiver.recv().await {
                        Ok(Notice::Change(event)) if matches_any(&event.key, &prefixes) => {
                            return Some((Ok(event), Some(receiver)));
                        }
                        Ok(Notice::Change(_)) => continue,
                        Ok(Notice::Disconnect) => {
                            return Some((
                                Err(OverlayError::unavailable("store connection lost")),
                                None,
                            ));
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            return Some((
                                Err(OverlayError::unavailable(format!(
                                    "watch lagged behind by {missed} notifications"
                                ))),
                                None,
                            ));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn supports_watch(&self) -> bool {
        self.watch_supported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn prefixes() -> Vec<String> {
        vec!["/config/dev/".to_string(), "/config/extensions/".to_string()]
    }

    #[tokio::test]
    async fn test_fetch_filters_by_prefix() {
        let store = MemoryStore::new();
        store.put_json("/config/dev/A", &json!(1));
        store.put_json("/config/prod/A", &json!(2));
        store.put_json("/config/extensions/s/B", &json!("x"));

        let response = store.fetch_entries(&prefixes()).await.unwrap();
        assert_eq!(response.revision, 3);
        let keys: Vec<_> = response.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["/config/dev/A", "/config/extensions/s/B"]);
        assert_eq!(response.entries[0].value, b"1");
    }

    #[tokio::test]
    async fn test_delete_bumps_revision() {
        let store = MemoryStore::new();
        store.put("/config/dev/A", "1");
        assert_eq!(store.delete("/config/dev/A"), Some(2));
        assert_eq!(store.delete("/config/dev/A"), None);
        assert_eq!(store.revision(), 2);
    }

    #[tokio::test]
    async fn test_watch_delivers_matching_changes() {
        let store = MemoryStore::new();
        let mut stream = store.watch(&prefixes()).await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        store.put("/config/prod/IGNORED", "1");
        store.put("/config/dev/A", "1");

        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timed out waiting for change")
            .expect("stream ended")
            .unwrap();
        assert_eq!(event.key, "/config/dev/A");
        assert_eq!(event.kind, ChangeKind::Put);
        assert_eq!(event.revision, 2);
    }

    #[tokio::test]
    async fn test_outage_breaks_watch_and_fetch() {
        let store = MemoryStore::new();
        let mut stream = store.watch(&prefixes()).await.unwrap();

        store.set_available(false);
        let item = stream.next().await.expect("expected an error item");
        assert!(item.unwrap_err().is_transient());
        assert!(stream.next().await.is_none());

        assert!(store.fetch_entries(&prefixes()).await.is_err());
        assert!(store.watch(&prefixes()).await.is_err());

        store.set_available(true);
        assert!(store.fetch_entries(&prefixes()).await.is_ok());
    }

    #[test]
    fn test_without_watch() {
        let store = MemoryStore::new().without_watch().with_name("polled");
        assert!(!store.supports_watch());
        assert_eq!(store.name(), "polled");
    }
}
