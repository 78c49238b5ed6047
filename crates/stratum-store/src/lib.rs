//! # Stratum Store
//!
//! Store client implementations for Stratum.
//!
//! This crate provides concrete implementations of the [`StoreClient`] interface
//! defined in `stratum-core`.
//!
//! ## Features
//!
//! - `http-client`: etcd v3 JSON gateway client ([`EtcdGatewayClient`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  stratum-runtime    │  (fetcher + monitor)
//! ├─────────────────────┤
//! │  stratum-core       │  (StoreClient trait)
//! ├─────────────────────┤
//! │  stratum-store      │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  etcd / in-process  │
//! └─────────────────────┘
//! ```
//!
//! ## Implementations
//!
//! | Client | Push | Use Case |
//! |--------|------|----------|
//! | `MemoryStore` | broadcast channel | Tests, single-process setups |
//! | `EtcdGatewayClient` | `/v3/watch` stream | Production etcd clusters |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratum_core::{ConfigFetcher, KeyLayout};
//! use stratum_store::{EtcdGatewayClient, EtcdGatewayConfig};
//!
//! let client = EtcdGatewayClient::new(EtcdGatewayConfig::new("http://127.0.0.1:2379"))?;
//! let fetcher = ConfigFetcher::new(Arc::new(client), KeyLayout::default(), "prod")?;
//! let snapshot = fetcher.load().await?;
//! ```

pub mod memory;

#[cfg(feature = "http-client")]
pub mod http;

pub use memory::MemoryStore;

#[cfg(feature = "http-client")]
pub use http::{EtcdGatewayClient, EtcdGatewayConfig};

pub use stratum_core::StoreClient;
