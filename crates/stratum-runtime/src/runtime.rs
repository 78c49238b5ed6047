//! The `Stratum` facade: construct, start monitoring, serve.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stratum_runtime::Stratum;
//!
//! // Loads stratum.toml, STRATUM_* variables, sets up logging and performs
//! // the initial store read.
//! let stratum = Stratum::builder().build().await?;
//! stratum.start_monitoring()?;
//!
//! let timeout = stratum.resolve("TIMEOUT", Some(&request));
//! ```
//!
//! Without a `[store]` section the process runs on `dev_params` alone and
//! monitoring is a no-op.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::signal;
use tracing::{debug, info};

use stratum_core::{
    AttributeMap, AttributeValue, BaseConfig, ConfigFetcher, KeyLayout, OverlayCache,
    OverlayResult, OverlaySnapshot, RequestContext, ResolutionEngine, SelectorResolver,
    SourceMode, StoreClient,
};

use crate::config::{ConfigLoader, StoreConfig, StratumConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::monitor::{Monitor, MonitorStats};

/// Layered attribute resolution with live store refresh.
///
/// Owned by the host and shared by reference (typically `Arc<Stratum>`).
/// Resolution never performs I/O; only construction and the monitor read
/// from the store.
pub struct Stratum {
    config: StratumConfig,
    engine: ResolutionEngine,
    monitor: Option<Monitor>,
}

impl Stratum {
    /// Creates a builder that loads configuration from the usual places.
    pub fn builder() -> StratumBuilder {
        StratumBuilder::new()
    }

    /// Creates an instance from configuration.
    ///
    /// The configuration is validated first. With a `store` section this connects to it and performs the initial
    /// load; failure there is returned, as there is no snapshot to serve.
    pub async fn from_config(config: StratumConfig) -> RuntimeResult<Self> {
        let client = match &config.store {
            Some(store) => Some(connect_store(store)?),
            None => None,
        };
        Self::assemble(config, client).await
    }

    /// Creates an instance reading from the given store client.
    ///
    /// The key layout comes from the `store` section when present.
    pub async fn with_store(
        config: StratumConfig,
        client: Arc<dyn StoreClient>,
    ) -> RuntimeResult<Self> {
        Self::assemble(config, Some(client)).await
    }

    async fn assemble(
        config: StratumConfig,
        client: Option<Arc<dyn StoreClient>>,
    ) -> RuntimeResult<Self> {
        validate_config(&config)?;
        let base = BaseConfig::new(config.base.clone());
        let selector = if config.selector.enabled {
            SelectorResolver::new(config.selector.signal_key.clone())
        } else {
            SelectorResolver::disabled()
        };

        let (cache, monitor) = match client {
            Some(client) => {
                let layout = config
                    .store
                    .as_ref()
                    .map(|s| KeyLayout::new(&s.root, &s.extensions_dir))
                    .unwrap_or_default();
                let fetcher = ConfigFetcher::new(client, layout, config.env.clone())?;
                let initial = fetcher.load().await?;
                info!(
                    store = fetcher.client().name(),
                    env = %config.env,
                    revision = initial.revision(),
                    "Initial snapshot loaded"
                );
                let cache = Arc::new(OverlayCache::new(base, initial, SourceMode::Store));
                let monitor = Monitor::new(fetcher, Arc::clone(&cache), config.monitor.clone());
                (cache, Some(monitor))
            }
            None => {
                let snapshot = ConfigFetcher::static_defaults(&config.dev_params);
                info!(
                    env = %config.env,
                    dev_params = config.dev_params.len(),
                    "No store configured, serving dev parameters"
                );
                let cache = Arc::new(OverlayCache::new(base, snapshot, SourceMode::Static));
                (cache, None)
            }
        };

        Ok(Self {
            engine: ResolutionEngine::new(cache, selector),
            config,
            monitor,
        })
    }

    pub fn config(&self) -> &StratumConfig {
        &self.config
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    pub fn mode(&self) -> SourceMode {
        self.engine.cache().mode()
    }

    /// Resolves `name` for the given request context.
    pub fn resolve(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> Option<AttributeValue> {
        self.engine.resolve(name, context)
    }

    /// Resolves `name`, reporting a missing attribute as an error.
    pub fn require(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> OverlayResult<AttributeValue> {
        self.engine.require(name, context)
    }

    /// Resolves `name` and deserializes it into `T`.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        name: &str,
        context: Option<&dyn RequestContext>,
    ) -> OverlayResult<T> {
        self.engine.get_as(name, context)
    }

    /// Base attributes overlaid with the current environment defaults.
    pub fn as_mapping(&self) -> AttributeMap {
        self.engine.as_mapping()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<OverlaySnapshot> {
        self.engine.cache().get()
    }

    /// Starts background refresh. Idempotent; a no-op without a store.
    pub fn start_monitoring(&self) -> RuntimeResult<()> {
        match &self.monitor {
            Some(monitor) => monitor.start(),
            None => {
                debug!("No store configured, nothing to monitor");
                Ok(())
            }
        }
    }

    /// Stops background refresh and waits for the task to exit.
    pub async fn stop_monitoring(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.stop().await;
        }
    }

    /// Reloads from the store now. Returns whether a snapshot was published.
    pub async fn refresh_now(&self) -> RuntimeResult<bool> {
        match &self.monitor {
            Some(monitor) => Ok(monitor.refresh_now().await?),
            None => Ok(false),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(Monitor::is_running)
    }

    /// Monitor counters, or `None` without a store.
    pub fn monitor_stats(&self) -> Option<MonitorStats> {
        self.monitor.as_ref().map(Monitor::stats)
    }

    /// Monitors until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Monitors until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start_monitoring()?;
        info!("Stratum is now running");

        shutdown.await;

        self.stop_monitoring().await;
        info!("Stratum stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Stratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stratum")
            .field("env", &self.config.env)
            .field("mode", &self.mode())
            .field("revision", &self.snapshot().revision())
            .finish()
    }
}

/// Builds the store client named by the `store` section.
#[cfg(feature = "http-client")]
fn connect_store(store: &StoreConfig) -> RuntimeResult<Arc<dyn StoreClient>> {
    use stratum_store::{EtcdGatewayClient, EtcdGatewayConfig};

    let config = EtcdGatewayConfig {
        request_timeout: store.request_timeout(),
        connect_timeout: store.connect_timeout(),
        ..EtcdGatewayConfig::new(&store.endpoint)
    };
    let client = EtcdGatewayClient::new(config).map_err(|e| RuntimeError::StoreClient(e.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http-client"))]
fn connect_store(store: &StoreConfig) -> RuntimeResult<Arc<dyn StoreClient>> {
    Err(RuntimeError::StoreClient(format!(
        "cannot connect to {}: built without the `http-client` feature",
        store.endpoint
    )))
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// StratumBuilder
// =============================================================================

/// Builder for creating a `Stratum` from layered configuration.
///
/// # Example
///
/// ```rust,ignore
/// let stratum = Stratum::builder()
///     .config_file("config/stratum.toml")
///     .profile("production")
///     .build()
///     .await?;
/// ```
pub struct StratumBuilder {
    config_loader: ConfigLoader,
    store: Option<Arc<dyn StoreClient>>,
    init_logging: bool,
}

impl StratumBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            store: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: StratumConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Reads from `client` instead of the store named in the configuration.
    pub fn store(mut self, client: Arc<dyn StoreClient>) -> Self {
        self.store = Some(client);
        self
    }

    /// Leaves logging setup to the host.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads configuration, sets up logging and performs the initial load.
    pub async fn build(self) -> RuntimeResult<Stratum> {
        let config = self.config_loader.load()?;
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        match self.store {
            Some(client) => Stratum::with_store(config, client).await,
            None => Stratum::from_config(config).await,
        }
    }
}

impl Default for StratumBuilder {
    fn default() -> Self {
        Self::new()
    }
}
