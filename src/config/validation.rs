//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs, value ranges and object names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConfiguratorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ConfiguratorConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("resilience.max_backoff_secs ({max}) is below initial_backoff_secs ({initial})")]
    BackoffRange { initial: u64, max: u64 },

    #[error("resilience.jitter_percent must be at most 100, got {0}")]
    Jitter(u8),

    #[error("registry.key_prefix must start with '/', got '{0}'")]
    KeyPrefix(String),

    #[error("observability.metrics_address: invalid socket address '{0}'")]
    MetricsAddress(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ConfiguratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("registry.base_url", &config.registry.base_url),
        ("registry.store_url", &config.registry.store_url),
    ] {
        if url::Url::parse(value).is_err() {
            errors.push(ValidationError::InvalidUrl { field, value: value.clone() });
        }
    }

    for (field, value) in [
        ("registry.namespace", &config.registry.namespace),
        ("registry.keys_secret", &config.registry.keys_secret),
        ("render.config_path", &config.render.config_path),
        ("render.ssl_dir", &config.render.ssl_dir),
        ("proxy.binary", &config.proxy.binary),
        ("proxy.pid_file", &config.proxy.pid_file),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::Empty { field });
        }
    }

    if !config.registry.key_prefix.starts_with('/') {
        errors.push(ValidationError::KeyPrefix(config.registry.key_prefix.clone()));
    }

    if config.registry.history_window == 0 {
        errors.push(ValidationError::Zero { field: "registry.history_window" });
    }

    let resilience = &config.resilience;
    if resilience.initial_backoff_secs == 0 {
        errors.push(ValidationError::Zero { field: "resilience.initial_backoff_secs" });
    }
    if resilience.max_backoff_secs < resilience.initial_backoff_secs {
        errors.push(ValidationError::BackoffRange {
            initial: resilience.initial_backoff_secs,
            max: resilience.max_backoff_secs,
        });
    }
    if resilience.jitter_percent > 100 {
        errors.push(ValidationError::Jitter(resilience.jitter_percent));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(config.observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ConfiguratorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ConfiguratorConfig::default();
        config.registry.base_url = "not a url".into();
        config.registry.namespace = "".into();
        config.resilience.initial_backoff_secs = 8;
        config.resilience.max_backoff_secs = 4;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::Empty { field: "registry.namespace" }));
        assert!(errors.contains(&ValidationError::BackoffRange { initial: 8, max: 4 }));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ConfiguratorConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MetricsAddress("nope".into())]);
    }
}
