//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, MonitorConfig, StoreConfig, StratumConfig};

/// Largest accepted backoff multiplier.
const MAX_BACKOFF_MULTIPLIER: f64 = 100.0;

/// Validates the entire configuration.
pub fn validate_config(config: &StratumConfig) -> ConfigResult<()> {
    validate_env(config)?;
    if let Some(store) = &config.store {
        validate_store_config(store)?;
    }
    if config.selector.enabled && config.selector.signal_key.trim().is_empty() {
        return Err(ConfigError::missing_field("selector.signal_key"));
    }
    validate_monitor_config(&config.monitor)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the environment name against the key layout.
fn validate_env(config: &StratumConfig) -> ConfigResult<()> {
    if config.env.is_empty() {
        return Err(ConfigError::missing_field("env"));
    }
    if config.env.contains('/') {
        return Err(ConfigError::validation(format!(
            "Environment name '{}' must not contain '/'",
            config.env
        )));
    }
    if let Some(store) = &config.store
        && store.extensions_dir.trim_matches('/') == config.env
    {
        return Err(ConfigError::validation(format!(
            "Environment name '{}' collides with the extensions directory",
            config.env
        )));
    }
    Ok(())
}

/// Validates store connection settings.
fn validate_store_config(store: &StoreConfig) -> ConfigResult<()> {
    if !store.endpoint.starts_with("http://") && !store.endpoint.starts_with("https://") {
        return Err(ConfigError::invalid_url(
            &store.endpoint,
            "URL must start with http:// or https://",
        ));
    }

    if store.root.trim_matches('/').is_empty() {
        return Err(ConfigError::missing_field("store.root"));
    }

    if store.extensions_dir.trim_matches('/').is_empty() {
        return Err(ConfigError::missing_field("store.extensions_dir"));
    }

    if store.request_timeout_ms == 0 || store.connect_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Store timeouts must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates refresh settings.
fn validate_monitor_config(monitor: &MonitorConfig) -> ConfigResult<()> {
    if monitor.poll_interval_ms == 0 {
        return Err(ConfigError::validation(
            "Poll interval must be greater than 0",
        ));
    }

    if monitor.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if monitor.max_delay_ms < monitor.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if !monitor.backoff_multiplier.is_finite() {
        return Err(ConfigError::validation(
            "Backoff multiplier must be a finite number",
        ));
    }

    if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&monitor.backoff_multiplier) {
        return Err(ConfigError::validation(format!(
            "Backoff multiplier must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}"
        )));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config() -> StratumConfig {
        StratumConfig {
            env: "prod".to_string(),
            store: Some(StoreConfig::default()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&StratumConfig::default()).is_ok());
        assert!(validate_config(&store_config()).is_ok());
    }

    #[test]
    fn test_env_rules() {
        let mut config = store_config();
        config.env = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.env = "a/b".to_string();
        assert!(validate_config(&config).is_err());

        config.env = "extensions".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = store_config();
        if let Some(store) = config.store.as_mut() {
            store.endpoint = "etcd:2379".to_string();
        }
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_backoff_rules() {
        let mut config = StratumConfig::default();
        config.monitor.max_delay_ms = 10;
        config.monitor.initial_delay_ms = 100;
        assert!(validate_config(&config).is_err());

        let mut config = StratumConfig::default();
        config.monitor.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());

        for multiplier in [f64::NAN, f64::INFINITY, 1e20] {
            config.monitor.backoff_multiplier = multiplier;
            assert!(
                validate_config(&config).is_err(),
                "multiplier {multiplier} accepted"
            );
        }

        config.monitor.backoff_multiplier = 1.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = StratumConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("stratum.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_disabled_selector_skips_signal_key() {
        let mut config = StratumConfig::default();
        config.selector.signal_key = " ".to_string();
        assert!(validate_config(&config).is_err());

        config.selector.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
