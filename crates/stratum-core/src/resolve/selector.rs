//! Override-set selection from request-scoped metadata.
//!
//! Callers pass their request context explicitly; the resolver reads one
//! signal value from it (by default the `X-Dynamic-Setting` header) and splits
//! it into an ordered list of config-set identifiers.

use std::collections::{BTreeMap, HashMap};

/// Default metadata key carrying the override-set signal.
pub const DEFAULT_SIGNAL_KEY: &str = "X-Dynamic-Setting";

/// Read access to request-scoped metadata.
pub trait RequestContext {
    /// Returns the metadata value stored under `key`, if any.
    fn meta(&self, key: &str) -> Option<&str>;
}

impl RequestContext for HashMap<String, String> {
    fn meta(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl RequestContext for BTreeMap<String, String> {
    fn meta(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Header-like request metadata with case-insensitive keys.
///
/// # Example
///
/// ```rust
/// use stratum_core::{RequestContext, RequestMeta};
///
/// let meta = RequestMeta::new().with("X-Dynamic-Setting", "promoA promoB");
/// assert_eq!(meta.meta("x-dynamic-setting"), Some("promoA promoB"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    entries: HashMap<String, String>,
}

impl RequestMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }
}

impl RequestContext for RequestMeta {
    fn meta(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Ordered list of config-set identifiers for one resolution.
///
/// Later entries take precedence over earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorList(Vec<String>);

impl SelectorList {
    /// Parses a whitespace-delimited signal, dropping empty tokens.
    pub fn parse(signal: &str) -> Self {
        Self(signal.split_whitespace().map(str::to_string).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for SelectorList {
    fn from(ids: Vec<String>) -> Self {
        Self(ids)
    }
}

impl<'a> IntoIterator for &'a SelectorList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Extracts the selector list from a request context.
#[derive(Debug, Clone)]
pub struct SelectorResolver {
    /// Metadata key to read; `None` when selection is disabled.
    signal_key: Option<String>,
}

impl SelectorResolver {
    /// Creates a resolver reading `signal_key`.
    pub fn new(signal_key: impl Into<String>) -> Self {
        Self {
            signal_key: Some(signal_key.into()),
        }
    }

    /// Creates a resolver that never selects any set.
    pub fn disabled() -> Self {
        Self { signal_key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.signal_key.is_some()
    }

    pub fn signal_key(&self) -> Option<&str> {
        self.signal_key.as_deref()
    }

    /// Returns the override sets requested by `context`, in order.
    ///
    /// Yields an empty list when disabled, when there is no context, or when
    /// the signal is missing or blank.
    pub fn selectors(&self, context: Option<&dyn RequestContext>) -> SelectorList {
        let (Some(key), Some(context)) = (self.signal_key.as_deref(), context) else {
            return SelectorList::default();
        };
        context
            .meta(key)
            .map(SelectorList::parse)
            .unwrap_or_default()
    }
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_KEY)
    }
}
