//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ConfiguratorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides the registry API base URL.
pub const ENV_REGISTRY_BASE: &str = "K8SBASE";

/// Supplies the statistics page password.
pub const ENV_STATS_PASSWORD: &str = "STATISTICS_PASSWORD";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML configuration file without validating it.
pub fn parse_config(path: &Path) -> Result<ConfiguratorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply environment overrides using the given lookup.
///
/// Takes the lookup as a parameter so tests do not have to mutate the process
/// environment.
pub fn apply_env_overrides<F>(config: &mut ConfiguratorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base) = lookup(ENV_REGISTRY_BASE).filter(|v| !v.is_empty()) {
        config.registry.base_url = base;
    }
    if let Some(password) = lookup(ENV_STATS_PASSWORD) {
        config.render.stats_password = Some(password);
    }
}

/// Load configuration (file if given, defaults otherwise), apply the process
/// environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<ConfiguratorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(path)?,
        None => ConfiguratorConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Transport;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ConfiguratorConfig = toml::from_str(
            r#"
            transport = "poll"

            [registry]
            namespace = "edge"

            [resilience]
            max_backoff_secs = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.transport, Transport::Poll);
        assert_eq!(config.registry.namespace, "edge");
        assert_eq!(config.registry.keys_secret, "keys");
        assert_eq!(config.resilience.initial_backoff_secs, 1);
        assert_eq!(config.resilience.max_backoff_secs, 16);
        assert_eq!(config.render.config_path, "haproxy.cfg");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_REGISTRY_BASE, "http://api.internal:8080"),
            (ENV_STATS_PASSWORD, "s3cret"),
        ]);
        let mut config = ConfiguratorConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.registry.base_url, "http://api.internal:8080");
        assert_eq!(config.render.stats_password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_empty_base_override_ignored() {
        let mut config = ConfiguratorConfig::default();
        apply_env_overrides(&mut config, |k| (k == ENV_REGISTRY_BASE).then(String::new));
        assert_eq!(config.registry.base_url, "http://127.0.0.1:8000");
        assert!(config.render.stats_password.is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = parse_config(Path::new("/nonexistent/lb-configurator.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![
            ValidationError::Empty { field: "registry.namespace" },
            ValidationError::Jitter(120),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: registry.namespace must not be empty, resilience.jitter_percent must be at most 100, got 120"
        );
    }
}
