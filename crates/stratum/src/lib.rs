//! # Stratum
//!
//! Layered attribute resolution with live refresh from a distributed
//! key-value store.
//!
//! ## Overview
//!
//! Every attribute lookup walks up to three layers, lowest first:
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────────────────────┐
//! │ base config │──▶│ env defaults │──▶│ config sets named by the    │──▶ value
//! │  (static)   │   │ (from store) │   │ request's X-Dynamic-Setting │
//! └─────────────┘   └──────────────┘   └─────────────────────────────┘
//! ```
//!
//! - **Base config**: the application's own settings, fixed at startup
//! - **Env defaults**: per-environment values read from the store
//! - **Config sets**: named overrides chosen per request, later names winning
//!
//! Mapping values merge recursively across sets; everything else is replaced.
//! A background monitor keeps the store-backed layers current without ever
//! exposing a half-updated view to readers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stratum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stratum = Stratum::builder().build().await?;
//!     stratum.start_monitoring()?;
//!
//!     let request = RequestMeta::new().with("X-Dynamic-Setting", "beta canary");
//!     let limit: u32 = stratum.get_as("RATE_LIMIT", Some(&request))?;
//!
//!     stratum.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `http-client`: etcd v3 JSON gateway store client

pub use stratum_core as core;
pub use stratum_runtime as runtime;
pub use stratum_store as store;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use stratum::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use stratum_runtime::{RuntimeError, Stratum, StratumBuilder, StratumConfig};

    // Resolution - for passing request context
    pub use stratum_core::{
        AttributeMap, AttributeValue, OverlayError, RequestContext, RequestMeta, SourceMode,
    };

    // Store clients
    pub use stratum_core::StoreClient;
    pub use stratum_store::MemoryStore;
    #[cfg(feature = "http-client")]
    pub use stratum_store::{EtcdGatewayClient, EtcdGatewayConfig};
}
