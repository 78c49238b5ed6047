//! Stratum Runtime - Orchestration layer for Stratum.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `StratumConfig`)
//! - Logging configuration (`LoggingBuilder`)
//! - Background snapshot refresh (`Monitor`)
//! - The caller-facing facade (`Stratum`)
//!
//! # Lifecycle
//!
//! Construct, start monitoring, serve:
//!
//! ```ignore
//! use stratum_runtime::Stratum;
//! use stratum_core::RequestMeta;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stratum = Stratum::builder().build().await?;
//!     stratum.start_monitoring()?;
//!
//!     let request = RequestMeta::new().with("X-Dynamic-Setting", "beta");
//!     let flags = stratum.resolve("FEATURE_FLAGS", Some(&request));
//!
//!     stratum.stop_monitoring().await;
//!     Ok(())
//! }
//! ```
//!
//! # Store Support
//!
//! - `http-client`: connect to etcd through its JSON gateway when the
//!   configuration has a `[store]` section
//!
//! Any other [`StoreClient`](stratum_core::StoreClient) can be passed to
//! [`StratumBuilder::store`].

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, StratumConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use monitor::{Monitor, MonitorStats};
pub use runtime::{Stratum, StratumBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
