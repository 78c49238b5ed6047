//! Configuration loader using figment.
//!
//! This module provides a flexible configuration loading system that supports:
//!
//! - **Multiple sources**: TOML/YAML files, environment variables, programmatic defaults
//! - **Layered configuration**: Later sources override earlier ones
//! - **Profile support**: Per-deployment configuration files
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`stratum.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`stratum.yaml`, `stratum.yml`, etc.)
//!
//! Both features can be enabled simultaneously; if so, both file formats are searched and loaded.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic merges
//! 3. Main config file (`stratum.toml` / `stratum.yaml`)
//! 4. Profile-specific config file (`stratum.{profile}.toml` / `stratum.{profile}.yaml`)
//! 5. Environment variables (`STRATUM_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `STRATUM_` prefix with `__` as separator.
//! Keys are lowercased:
//!
//! - `STRATUM_ENV=prod` → `env = "prod"`
//! - `STRATUM_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `STRATUM_STORE__ENDPOINT=http://etcd:2379` → `store.endpoint = "http://etcd:2379"`
//!
//! The profile is taken from `STRATUM_PROFILE` unless set explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_runtime::config::ConfigLoader;
//!
//! // Simple loading from default locations
//! let config = ConfigLoader::new().load()?;
//!
//! // Load with specific profile
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//!
//! // Load from specific file with env overrides
//! let config = ConfigLoader::new()
//!     .file("./config/stratum.toml")
//!     .with_env()
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use stratum_core::AttributeMap;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::StratumConfig;
use super::validation::validate_config;

/// Environment variable prefix.
const ENV_PREFIX: &str = "STRATUM_";

/// Environment variable selecting the profile.
const PROFILE_VAR: &str = "STRATUM_PROFILE";

/// Configuration profile for deployment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the usual short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Creates a profile from `STRATUM_PROFILE` or defaults to Development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
///
/// # Example
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .file("stratum.toml")
///     .with_env()
///     .load()?;
/// ```
pub struct ConfigLoader {
    /// Base figment instance.
    figment: Figment,
    /// Configuration profile.
    profile: Profile,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("stratum"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = ConfigLoader::new()
    ///     .merge(StratumConfig {
    ///         env: "staging".into(),
    ///         ..Default::default()
    ///     })
    ///     .load()?;
    /// ```
    pub fn merge(mut self, config: StratumConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<StratumConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let mut config: StratumConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        if let Some(path) = config.dev_params_file.clone() {
            let mut params = load_dev_params_file(&path)?;
            params.extend(std::mem::take(&mut config.dev_params));
            config.dev_params = params;
        }

        validate_config(&config)?;

        debug!(
            profile = %profile,
            env = %config.env,
            store = config.store.is_some(),
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        // Start with defaults
        let mut figment = Figment::from(Serialized::defaults(StratumConfig::default()));

        // Merge user's pre-configured figment
        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        // Load config files
        if let Some(path) = self.config_file.clone() {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, &path)?;
            } else {
                return Err(ConfigError::FileNotFound(path));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        // Load environment variables
        if self.load_env {
            trace!("Loading environment variables with STRATUM_ prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    ///
    /// Only extensions enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("stratum"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Common search logic for a single file format.
    ///
    /// Iterates `search_paths × base_names`; the first directory holding a base
    /// file or its profile variant wins. The profile variant is merged over the
    /// base file.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };
                let base_path = search_path.join(base_name);
                let profile_path =
                    search_path.join(format!("{}.{}.{}", stem, self.profile.as_str(), ext));

                let mut found = false;
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    found = true;
                }
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                    found = true;
                }
                if found {
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    /// Searches for and loads configuration files from search paths.
    ///
    /// Which file formats are attempted is controlled by the `toml-config` and `yaml-config`
    /// feature flags.  Each enabled format is searched independently.
    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["stratum.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["stratum.yaml", "stratum.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(
                paths = search_paths.len(),
                "No configuration file found, using defaults"
            );
        }
        figment
    }
}

/// Reads a flat table of dev parameters from a TOML, YAML or JSON file.
fn load_dev_params_file(path: &Path) -> ConfigResult<AttributeMap> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    debug!(path = %path.display(), "Loading dev parameters");

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "json" => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| {
                ConfigError::ParseError(format!("Invalid dev parameters in {}: {e}", path.display()))
            })
        }
        #[cfg(feature = "toml-config")]
        "toml" => Ok(Figment::from(Toml::file(path)).extract()?),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(Figment::from(Yaml::file(path)).extract()?),
        _ => Err(ConfigError::ParseError(format!(
            "Unsupported or disabled dev parameter file format: .{ext}"
        ))),
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<StratumConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<StratumConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use figment::Jail;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.env, "dev");
            assert!(config.store.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("STRATUM_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            jail.set_env("STRATUM_PROFILE", "canary");
            assert_eq!(Profile::from_env(), Profile::Custom("canary".to_string()));
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "stratum.toml",
                r#"
                env = "prod"

                [base]
                TIMEOUT = 30
                GREETING = "hello"

                [store]
                endpoint = "http://etcd:2379"

                [logging]
                level = "warn"
                "#,
            )?;
            jail.set_env("STRATUM_LOGGING__LEVEL", "debug");
            jail.set_env("STRATUM_MONITOR__POLL_INTERVAL_MS", "250");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();

            assert_eq!(config.env, "prod");
            assert_eq!(config.base.get("TIMEOUT"), Some(&json!(30)));
            assert_eq!(config.base.get("GREETING"), Some(&json!("hello")));
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.monitor.poll_interval_ms, 250);
            let store = config.store.unwrap();
            assert_eq!(store.endpoint, "http://etcd:2379");
            assert_eq!(store.root, "/config");
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_profile_file_overrides_base_file() {
        Jail::expect_with(|jail| {
            jail.create_file("stratum.toml", "env = \"dev\"\n[base]\nA = 1\nB = 1\n")?;
            jail.create_file("stratum.staging.toml", "env = \"staging\"\n[base]\nB = 2\n")?;

            let config = ConfigLoader::new()
                .profile("staging")
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.env, "staging");
            assert_eq!(config.base.get("A"), Some(&json!(1)));
            assert_eq!(config.base.get("B"), Some(&json!(2)));
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_dev_params_file_is_merged_under_inline_params() {
        Jail::expect_with(|jail| {
            jail.create_file("dev.json", r#"{"DEBUG": true, "LEVEL": 1}"#)?;
            jail.create_file(
                "stratum.toml",
                "dev_params_file = \"dev.json\"\n[dev_params]\nLEVEL = 5\n",
            )?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.dev_params.get("DEBUG"), Some(&json!(true)));
            assert_eq!(config.dev_params.get("LEVEL"), Some(&json!(5)));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let result = ConfigLoader::new().file("missing.toml").without_env().load();
            assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_invalid_config_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("stratum.toml", "env = \"extensions\"\n[store]\n")?;

            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();
            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
            Ok(())
        });
    }
}
