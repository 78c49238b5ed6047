//! # Stratum Core
//!
//! The attribute resolution and overlay engine of Stratum.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Values**: JSON attribute values, truthiness and deep merge ([`AttributeValue`], [`deep_merge`])
//! - **Base layer**: the static lowest-precedence configuration ([`BaseConfig`])
//! - **Errors**: the overlay error taxonomy ([`OverlayError`])
//!
//! ### Overlay Layer
//!
//! - **Snapshots**: immutable pairings of environment defaults and config sets ([`OverlaySnapshot`])
//! - **Cache**: lock-free publication of the current snapshot ([`OverlayCache`])
//!
//! ### Resolution Layer
//!
//! - **Selectors**: ordered override-set lists read from a request ([`SelectorResolver`])
//! - **Engine**: the precedence algorithm ([`ResolutionEngine`])
//!
//! ### Integration Layer
//!
//! - **Store client**: the watchable key-value interface ([`StoreClient`])
//! - **Fetcher**: decoding store entries into snapshots ([`ConfigFetcher`])
//!
//! ## Precedence
//!
//! ```text
//! ┌──────────────┐
//! │ config set B │  highest (last selector)
//! │ config set A │
//! ├──────────────┤
//! │ env defaults │  from the current snapshot
//! ├──────────────┤
//! │ base config  │  lowest
//! └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stratum_core::{
//!     AttributeMap, BaseConfig, OverlayCache, OverlaySnapshot, RequestMeta, ResolutionEngine,
//!     SelectorResolver, SourceMode,
//! };
//!
//! let mut base = AttributeMap::new();
//! base.insert("greeting".into(), json!("hello"));
//!
//! let cache = OverlayCache::new(
//!     BaseConfig::new(base),
//!     OverlaySnapshot::empty(),
//!     SourceMode::Static,
//! );
//! let engine = ResolutionEngine::new(Arc::new(cache), SelectorResolver::default());
//!
//! let request = RequestMeta::new();
//! assert_eq!(engine.resolve("greeting", Some(&request)), Some(json!("hello")));
//! assert_eq!(engine.resolve("missing", None), None);
//! ```

// Architectural layers
pub mod foundation;
pub mod integration;
pub mod overlay;
pub mod resolve;

// Re-export foundation types
pub use foundation::{
    AttributeMap, AttributeValue, BaseConfig, OverlayError, OverlayResult, apply_override,
    deep_merge, is_truthy,
};

// Re-export overlay types
pub use overlay::{OverlayCache, OverlaySnapshot, SnapshotOrigin, SourceMode};

// Re-export resolution types
pub use resolve::{
    DEFAULT_SIGNAL_KEY, RequestContext, RequestMeta, ResolutionEngine, SelectorList,
    SelectorResolver,
};

// Re-export integration types
pub use integration::{
    ChangeKind, ConfigFetcher, DEFAULT_EXTENSIONS_DIR, DEFAULT_ROOT, FetchResponse, KeyLayout,
    StoreClient, StoreEntry, StoreEvent, WatchStream,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::overlay::{OverlayCache, OverlaySnapshot, SourceMode};
    pub use super::resolve::{RequestContext, RequestMeta, ResolutionEngine, SelectorResolver};
}
