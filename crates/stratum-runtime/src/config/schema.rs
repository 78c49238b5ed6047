//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratum_core::{AttributeMap, DEFAULT_EXTENSIONS_DIR, DEFAULT_ROOT, DEFAULT_SIGNAL_KEY};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumConfig {
    /// Environment whose defaults are loaded from the store.
    #[serde(default = "default_env")]
    pub env: String,

    /// The static lowest-precedence attribute layer.
    #[serde(default)]
    pub base: AttributeMap,

    /// Environment defaults used when no store is configured.
    #[serde(default)]
    pub dev_params: AttributeMap,

    /// Optional file (TOML, YAML or JSON) with more dev parameters.
    ///
    /// Entries in `dev_params` take precedence over the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_params_file: Option<PathBuf>,

    /// Store connection. When absent the process runs on `dev_params`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,

    /// Override-set selection.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Background refresh.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for StratumConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            base: AttributeMap::new(),
            dev_params: AttributeMap::new(),
            dev_params_file: None,
            store: None,
            selector: SelectorConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_env() -> String {
    "dev".to_string()
}

// =============================================================================
// Store
// =============================================================================

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the etcd JSON gateway.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Root prefix of the key namespace.
    #[serde(default = "default_root")]
    pub root: String,

    /// Directory under the root holding config sets.
    #[serde(default = "default_extensions_dir")]
    pub extensions_dir: String,

    /// Timeout for read requests in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for establishing connections in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            root: default_root(),
            extensions_dir: default_extensions_dir(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_extensions_dir() -> String {
    DEFAULT_EXTENSIONS_DIR.to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

// =============================================================================
// Selector
// =============================================================================

/// Override-set selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Whether request contexts are consulted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Request metadata key carrying the selector list.
    #[serde(default = "default_signal_key")]
    pub signal_key: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signal_key: default_signal_key(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_signal_key() -> String {
    DEFAULT_SIGNAL_KEY.to_string()
}

// =============================================================================
// Monitor
// =============================================================================

/// Background refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval for stores without push notifications, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Initial delay before re-subscribing after a watch failure.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between re-subscription attempts.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output` is `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `stratum_runtime = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: StratumConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.env, "dev");
        assert!(config.store.is_none());
        assert!(config.selector.enabled);
        assert_eq!(config.selector.signal_key, "X-Dynamic-Setting");
        assert_eq!(config.monitor.initial_delay(), Duration::from_millis(500));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_store_section_defaults() {
        let config: StratumConfig =
            serde_json::from_str(r#"{"store": {"endpoint": "http://etcd:2379"}}"#).unwrap();
        let store = config.store.unwrap();
        assert_eq!(store.endpoint, "http://etcd:2379");
        assert_eq!(store.root, "/config");
        assert_eq!(store.extensions_dir, "extensions");
        assert_eq!(store.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_log_level_names() {
        let level: LogLevel = serde_json::from_str(r#""warn""#).unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(level.to_string(), "warn");
        assert_eq!(level.to_tracing_level(), tracing::Level::WARN);
    }
}
