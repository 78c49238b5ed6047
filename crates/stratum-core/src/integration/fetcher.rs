//! Translates raw store entries into overlay snapshots.
//!
//! # Key Layout
//!
//! With root prefix `/config` and environment `prod`:
//!
//! ```text
//! /config/prod/<attr>                   → environment default <attr>
//! /config/extensions/<set>/<attr>       → attribute <attr> of config set <set>
//! ```
//!
//! Every value is a UTF-8 JSON document. Keys outside both prefixes are
//! ignored.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::store::{StoreClient, StoreEntry};
use crate::foundation::{AttributeMap, AttributeValue, OverlayError, OverlayResult};
use crate::overlay::OverlaySnapshot;

/// Default root prefix of the key namespace.
pub const DEFAULT_ROOT: &str = "/config";

/// Default directory holding config sets under the root.
pub const DEFAULT_EXTENSIONS_DIR: &str = "extensions";

/// Describes how environment defaults and config sets are laid out in the
/// store's key namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    root: String,
    extensions_dir: String,
}

impl KeyLayout {
    /// Creates a layout with the given root prefix and extensions directory.
    pub fn new(root: impl AsRef<str>, extensions_dir: impl AsRef<str>) -> Self {
        Self {
            root: root.as_ref().trim_end_matches('/').to_string(),
            extensions_dir: extensions_dir.as_ref().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn extensions_dir(&self) -> &str {
        &self.extensions_dir
    }

    /// Key prefix holding the defaults of `env`.
    pub fn env_prefix(&self, env: &str) -> String {
        format!("{}/{}/", self.root, env)
    }

    /// Key prefix holding every config set.
    pub fn sets_prefix(&self) -> String {
        format!("{}/{}/", self.root, self.extensions_dir)
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT, DEFAULT_EXTENSIONS_DIR)
    }
}

/// Loads overlay snapshots from a store.
///
/// Holds no mutable state: every [`load`](Self::load) builds an independent
/// snapshot from a single store read.
#[derive(Clone)]
pub struct ConfigFetcher {
    client: Arc<dyn StoreClient>,
    layout: KeyLayout,
    env: String,
}

impl ConfigFetcher {
    /// Creates a fetcher for environment `env`.
    ///
    /// Fails with `StoreMalformed` when `env` is empty, contains `/`, or
    /// collides with the extensions directory.
    pub fn new(
        client: Arc<dyn StoreClient>,
        layout: KeyLayout,
        env: impl Into<String>,
    ) -> OverlayResult<Self> {
        let env = env.into();
        if env.is_empty() || env.contains('/') {
            return Err(OverlayError::malformed(
                layout.env_prefix(&env),
                "environment name must be a single non-empty key segment",
            ));
        }
        if env == layout.extensions_dir() {
            return Err(OverlayError::malformed(
                layout.env_prefix(&env),
                "environment name collides with the extensions directory",
            ));
        }
        Ok(Self {
            client,
            layout,
            env,
        })
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// The prefixes read by [`load`](Self::load) and watched for changes.
    pub fn prefixes(&self) -> Vec<String> {
        vec![self.layout.env_prefix(&self.env), self.layout.sets_prefix()]
    }

    /// Reads both layers from the store in one request and decodes them.
    pub async fn load(&self) -> OverlayResult<OverlaySnapshot> {
        let response = self.client.fetch_entries(&self.prefixes()).await?;
        let snapshot = self.decode(&response.entries, response.revision)?;
        debug!(
            store = self.client.name(),
            env = %self.env,
            revision = response.revision,
            env_defaults = snapshot.env_defaults().len(),
            config_sets = snapshot.config_sets().len(),
            "Loaded overlay snapshot"
        );
        Ok(snapshot)
    }

    /// Derives a static snapshot from process-local dev parameters.
    pub fn static_defaults(dev_params: &AttributeMap) -> OverlaySnapshot {
        OverlaySnapshot::from_static(dev_params.clone())
    }

    /// Decodes raw entries into a snapshot.
    pub fn decode(&self, entries: &[StoreEntry], revision: u64) -> OverlayResult<OverlaySnapshot> {
        let env_prefix = self.layout.env_prefix(&self.env);
        let sets_prefix = self.layout.sets_prefix();

        let mut env_defaults = AttributeMap::new();
        let mut config_sets: HashMap<String, AttributeMap> = HashMap::new();

        for entry in entries {
            if let Some(attr) = entry.key.strip_prefix(&env_prefix) {
                if attr.is_empty() {
                    return Err(OverlayError::malformed(&entry.key, "empty attribute name"));
                }
                env_defaults.insert(attr.to_string(), decode_value(entry)?);
            } else if let Some(rest) = entry.key.strip_prefix(&sets_prefix) {
                let Some((set_id, attr)) = rest.split_once('/') else {
                    return Err(OverlayError::malformed(
                        &entry.key,
                        "expected <set>/<attribute> under the extensions directory",
                    ));
                };
                if set_id.is_empty() || attr.is_empty() {
                    return Err(OverlayError::malformed(
                        &entry.key,
                        "empty set identifier or attribute name",
                    ));
                }
                config_sets
                    .entry(set_id.to_string())
                    .or_default()
                    .insert(attr.to_string(), decode_value(entry)?);
            } else {
                trace!(key = %entry.key, "Ignoring key outside the overlay layout");
            }
        }

        Ok(OverlaySnapshot::new(env_defaults, config_sets, revision))
    }
}

impl std::fmt::Debug for ConfigFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFetcher")
            .field("store", &self.client.name())
            .field("layout", &self.layout)
            .field("env", &self.env)
            .finish()
    }
}

fn decode_value(entry: &StoreEntry) -> OverlayResult<AttributeValue> {
    serde_json::from_slice(&entry.value)
        .map_err(|e| OverlayError::malformed(&entry.key, format!("invalid JSON value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::store::{FetchResponse, WatchStream};
    use crate::overlay::SnapshotOrigin;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedStore {
        response: OverlayResult<FetchResponse>,
    }

    #[async_trait]
    impl StoreClient for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_entries(&self, _prefixes: &[String]) -> OverlayResult<FetchResponse> {
            self.response.clone()
        }

        async fn watch(&self, _prefixes: &[String]) -> OverlayResult<WatchStream> {
            Err(OverlayError::unavailable("fixed store cannot watch"))
        }
    }

    fn fetcher(entries: Vec<StoreEntry>) -> ConfigFetcher {
        let store = FixedStore {
            response: Ok(FetchResponse {
                revision: 42,
                entries,
            }),
        };
        ConfigFetcher::new(Arc::new(store), KeyLayout::default(), "prod").unwrap()
    }

    #[tokio::test]
    async fn test_load_splits_layers() {
        let fetcher = fetcher(vec![
            StoreEntry::new("/config/prod/TIMEOUT", "30", 40),
            StoreEntry::new("/config/prod/DB", r#"{"host": "db1"}"#, 41),
            StoreEntry::new("/config/extensions/promo/BANNER", r#""spring""#, 42),
            StoreEntry::new("/config/extensions/promo/DB", r#"{"pool": 8}"#, 42),
            StoreEntry::new("/config/staging/TIMEOUT", "99", 42),
        ]);

        let snapshot = fetcher.load().await.unwrap();
        assert_eq!(snapshot.revision(), 42);
        assert_eq!(snapshot.origin(), SnapshotOrigin::Store);
        assert_eq!(snapshot.env_default("TIMEOUT"), Some(&json!(30)));
        assert_eq!(snapshot.env_default("DB"), Some(&json!({"host": "db1"})));
        assert_eq!(snapshot.env_defaults().len(), 2);
        assert_eq!(snapshot.set_value("promo", "BANNER"), Some(&json!("spring")));
        assert_eq!(snapshot.config_set("promo").map(|s| s.len()), Some(2));
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let fetcher = fetcher(vec![StoreEntry::new("/config/prod/BROKEN", "{not json", 1)]);
        let err = fetcher.load().await.unwrap_err();
        assert!(matches!(err, OverlayError::StoreMalformed { ref key, .. } if key == "/config/prod/BROKEN"));
    }

    #[tokio::test]
    async fn test_set_without_attribute_is_malformed() {
        let fetcher = fetcher(vec![StoreEntry::new("/config/extensions/promo", "1", 1)]);
        assert!(matches!(
            fetcher.load().await,
            Err(OverlayError::StoreMalformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_propagates() {
        let store = FixedStore {
            response: Err(OverlayError::unavailable("connection refused")),
        };
        let fetcher = ConfigFetcher::new(Arc::new(store), KeyLayout::default(), "prod").unwrap();
        let err = fetcher.load().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_loads_are_independent() {
        let fetcher = fetcher(vec![StoreEntry::new("/config/prod/A", "1", 1)]);
        let first = fetcher.load().await.unwrap();
        let second = fetcher.load().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_env_collision_is_rejected() {
        let store = FixedStore {
            response: Ok(FetchResponse::default()),
        };
        let store: Arc<dyn StoreClient> = Arc::new(store);
        assert!(ConfigFetcher::new(store.clone(), KeyLayout::default(), "extensions").is_err());
        assert!(ConfigFetcher::new(store.clone(), KeyLayout::default(), "").is_err());
        assert!(ConfigFetcher::new(store, KeyLayout::default(), "a/b").is_err());
    }

    #[test]
    fn test_layout_normalizes_slashes() {
        let layout = KeyLayout::new("/settings/", "/sets/");
        assert_eq!(layout.env_prefix("dev"), "/settings/dev/");
        assert_eq!(layout.sets_prefix(), "/settings/sets/");
    }

    #[test]
    fn test_static_defaults() {
        let mut params = AttributeMap::new();
        params.insert("DEBUG".into(), json!(true));
        let snapshot = ConfigFetcher::static_defaults(&params);
        assert_eq!(snapshot.origin(), SnapshotOrigin::Static);
        assert_eq!(snapshot.env_default("DEBUG"), Some(&json!(true)));
        assert!(snapshot.config_sets().is_empty());
    }
}
