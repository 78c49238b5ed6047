//! The resolution engine.
//!
//! # Precedence (lowest to highest)
//!
//! 1. Base configuration
//! 2. Environment defaults from the current snapshot
//! 3. Config sets named by the request's selectors, in selector order
//!
//! Mappings are deep-merged, everything else is replaced. Override values that
//! are falsy (`0`, `""`, `false`, `null`, `[]`, `{}`) are skipped, so a config
//! set cannot override a setting *to* a falsy value.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::trace;

use super::selector::{RequestContext, SelectorResolver};
use crate::foundation::{
    AttributeMap, AttributeValue, OverlayError, OverlayResult, apply_override, is_truthy,
};
use crate::overlay::{OverlayCache, OverlaySnapshot};

/// Resolves attribute names against the layered overlay.
///
/// Resolution never performs I/O and never blocks on a concurrent refresh:
/// each call pins the snapshot current at its start and uses only that.
#[derive(Debug, Clone)]
pub struct ResolutionEngine {
    cache: Arc<OverlayCache>,
    selector: SelectorResolver,
}

impl ResolutionEngine {
    pub fn new(cache: Arc<OverlayCache>, selector: SelectorResolver) -> Self {
        Self { cache, selector }
    }

    pub fn cache(&self) -> &Arc<OverlayCache> {
        &self.cache
    }

    pub fn selector(&self) -> &SelectorResolver {
        &self.selector
    }

    /// Resolves `name` for the given request context.
    ///
    /// Returns `None` when no layer defines the attribute.
    pub fn resolve(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> Option<AttributeValue> {
        let snapshot = self.cache.get();
        self.resolve_in(&snapshot, name, context)
    }

    /// Resolves `name` against an explicitly pinned snapshot.
    pub fn resolve_in(
        &self,
        snapshot: &OverlaySnapshot,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> Option<AttributeValue> {
        let base = self.cache.base().get(name);

        let (mut value, mut exists) = match snapshot.env_default(name) {
            Some(env) => (Some(env.clone()), true),
            None => (base.cloned(), base.is_some()),
        };

        for set_id in &self.selector.selectors(context) {
            let Some(incoming) = snapshot.set_value(set_id, name) else {
                continue;
            };
            if !is_truthy(incoming) {
                trace!(attribute = name, set = %set_id, "Skipping falsy override");
                continue;
            }
            match value.as_mut() {
                Some(working) => apply_override(working, incoming),
                None => value = Some(incoming.clone()),
            }
            exists = true;
            trace!(attribute = name, set = %set_id, "Applied override");
        }

        match value {
            Some(v) if exists || is_truthy(&v) => Some(v),
            _ => None,
        }
    }

    /// Like [`resolve`](Self::resolve) but reports a missing attribute as an
    /// error.
    pub fn require(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> OverlayResult<AttributeValue> {
        self.resolve(name, context)
            .ok_or_else(|| OverlayError::AttributeNotFound(name.to_string()))
    }

    /// Resolves `name` and deserializes it into `T`.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> OverlayResult<T> {
        let value = self.require(name, context)?;
        serde_json::from_value(value).map_err(|e| OverlayError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns whether `name` resolves for the given context.
    pub fn contains(&self, name: &str, context: Option<&dyn RequestContext>) -> bool {
        self.resolve(name, context).is_some()
    }

    /// Exports every base attribute overlaid with the current environment
    /// defaults.
    ///
    /// Config sets are never applied: the export reflects environment-wide
    /// state only.
    pub fn as_mapping(&self) -> AttributeMap {
        let snapshot = self.cache.get();
        let mut items = self.cache.base().attributes().clone();
        for (name, value) in snapshot.env_defaults() {
            items.insert(name.clone(), value.clone());
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::BaseConfig;
    use crate::overlay::SourceMode;
    use crate::resolve::selector::{DEFAULT_SIGNAL_KEY, RequestMeta};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn map(value: Value) -> AttributeMap {
        match value {
            Value::Object(m) => m,
            other => panic!("expected mapping, got {other}"),
        }
    }

    fn engine(base: Value, env: Value, sets: Vec<(&str, Value)>) -> ResolutionEngine {
        let sets: HashMap<String, AttributeMap> = sets
            .into_iter()
            .map(|(id, attrs)| (id.to_string(), map(attrs)))
            .collect();
        let cache = OverlayCache::new(
            BaseConfig::new(map(base)),
            OverlaySnapshot::new(map(env), sets, 1),
            SourceMode::Store,
        );
        ResolutionEngine::new(Arc::new(cache), SelectorResolver::default())
    }

    fn request(signal: &str) -> RequestMeta {
        RequestMeta::new().with(DEFAULT_SIGNAL_KEY, signal)
    }

    #[test]
    fn test_missing_everywhere_is_not_found() {
        let engine = engine(json!({"a": 1}), json!({"b": 2}), vec![("s", json!({"c": 3}))]);
        let ctx = request("s");
        assert_eq!(engine.resolve("nope", Some(&ctx)), None);
        assert!(matches!(
            engine.require("nope", None),
            Err(OverlayError::AttributeNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_base_only_value_is_returned_unchanged() {
        let engine = engine(
            json!({"timeout": {"read": 5}}),
            json!({}),
            vec![("s", json!({"other": 1}))],
        );
        let ctx = request("s");
        assert_eq!(engine.resolve("timeout", None), Some(json!({"read": 5})));
        assert_eq!(engine.resolve("timeout", Some(&ctx)), Some(json!({"read": 5})));
    }

    #[test]
    fn test_env_defaults_beat_base() {
        let engine = engine(json!({"x": 1}), json!({"x": 2}), vec![]);
        assert_eq!(engine.resolve("x", None), Some(json!(2)));
    }

    #[test]
    fn test_selectors_deep_merge_in_order() {
        let engine = engine(
            json!({"x": {"a": 1, "b": 1}}),
            json!({}),
            vec![
                ("A", json!({"x": {"b": 2, "c": 2}})),
                ("B", json!({"x": {"c": 3, "d": 3}})),
            ],
        );
        let ctx = request("A B");
        assert_eq!(
            engine.resolve("x", Some(&ctx)),
            Some(json!({"a": 1, "b": 2, "c": 3, "d": 3}))
        );

        let reversed = request("B A");
        assert_eq!(
            engine.resolve("x", Some(&reversed)),
            Some(json!({"a": 1, "b": 2, "c": 2, "d": 3}))
        );
    }

    #[test]
    fn test_non_mapping_override_replaces() {
        let engine = engine(json!({"x": 1}), json!({}), vec![("A", json!({"x": 2}))]);
        let ctx = request("A");
        assert_eq!(engine.resolve("x", Some(&ctx)), Some(json!(2)));
    }

    #[test]
    fn test_falsy_overrides_are_not_applied() {
        let engine = engine(
            json!({"n": 5, "s": "on", "m": {"k": 1}, "b": true}),
            json!({}),
            vec![("A", json!({"n": 0, "s": "", "m": {}, "b": false}))],
        );
        let ctx = request("A");
        assert_eq!(engine.resolve("n", Some(&ctx)), Some(json!(5)));
        assert_eq!(engine.resolve("s", Some(&ctx)), Some(json!("on")));
        assert_eq!(engine.resolve("m", Some(&ctx)), Some(json!({"k": 1})));
        assert_eq!(engine.resolve("b", Some(&ctx)), Some(json!(true)));
    }

    #[test]
    fn test_falsy_override_does_not_create_attribute() {
        let engine = engine(json!({}), json!({}), vec![("A", json!({"flag": 0}))]);
        let ctx = request("A");
        assert_eq!(engine.resolve("flag", Some(&ctx)), None);
    }

    #[test]
    fn test_explicit_falsy_defaults_exist() {
        let engine = engine(json!({"zero": 0, "empty": {}}), json!({"off": false}), vec![]);
        assert_eq!(engine.resolve("zero", None), Some(json!(0)));
        assert_eq!(engine.resolve("empty", None), Some(json!({})));
        assert_eq!(engine.resolve("off", None), Some(json!(false)));
    }

    #[test]
    fn test_override_only_attribute_resolves() {
        let engine = engine(json!({}), json!({}), vec![("A", json!({"banner": "spring"}))]);
        let ctx = request("A");
        assert_eq!(engine.resolve("banner", Some(&ctx)), Some(json!("spring")));
        assert_eq!(engine.resolve("banner", None), None);
    }

    #[test]
    fn test_unknown_selector_is_ignored() {
        let engine = engine(json!({"x": 1}), json!({}), vec![("A", json!({"x": 2}))]);
        let ctx = request("ghost A ghost2");
        assert_eq!(engine.resolve("x", Some(&ctx)), Some(json!(2)));
    }

    #[test]
    fn test_merge_does_not_mutate_snapshot() {
        let engine = engine(
            json!({}),
            json!({"x": {"a": 1}}),
            vec![("A", json!({"x": {"b": 2}}))],
        );
        let ctx = request("A");
        assert_eq!(engine.resolve("x", Some(&ctx)), Some(json!({"a": 1, "b": 2})));
        assert_eq!(engine.resolve("x", None), Some(json!({"a": 1})));
        assert_eq!(engine.cache().get().env_default("x"), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let engine = engine(
            json!({"x": {"a": 1}}),
            json!({"x": {"a": 2}}),
            vec![("A", json!({"x": {"b": 3}}))],
        );
        let ctx = request("A");
        let first = engine.resolve("x", Some(&ctx));
        let second = engine.resolve("x", Some(&ctx));
        assert_eq!(first, second);
    }

    #[test]
    fn test_as_mapping_ignores_config_sets() {
        let engine = engine(
            json!({"a": 1, "b": 1}),
            json!({"b": 2, "c": 2}),
            vec![("A", json!({"a": 9, "d": 9}))],
        );
        assert_eq!(
            Value::Object(engine.as_mapping()),
            json!({"a": 1, "b": 2, "c": 2})
        );
    }

    #[test]
    fn test_get_as_decodes_typed_values() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Pool {
            min: u32,
            max: u32,
        }

        let engine = engine(json!({"pool": {"min": 1, "max": 4}}), json!({}), vec![]);
        let pool: Pool = engine.get_as("pool", None).unwrap();
        assert_eq!(pool, Pool { min: 1, max: 4 });

        let err = engine.get_as::<u32>("pool", None).unwrap_err();
        assert!(matches!(err, OverlayError::Decode { .. }));
        assert!(engine.contains("pool", None));
    }
}
