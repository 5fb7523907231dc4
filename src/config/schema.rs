//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the configurator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the configurator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConfiguratorConfig {
    /// Which registry protocol drives incremental updates.
    pub transport: Transport,

    /// Registry endpoints and object names.
    pub registry: RegistryConfig,

    /// Template rendering and output locations.
    pub render: RenderConfig,

    /// Proxy process invocation.
    pub proxy: ProxyConfig,

    /// Backoff settings for resync and watcher restarts.
    pub resilience: ResilienceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry transport style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One persistent watch stream per resource.
    #[default]
    Stream,
    /// A single sequential long-poll loop against the backing key store.
    Poll,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the cluster API (overridden by `K8SBASE`).
    pub base_url: String,

    /// Base URL of the key store used by the long-poll transport.
    pub store_url: String,

    /// Key prefix under which registry objects live in the key store.
    pub key_prefix: String,

    /// Namespace holding the `services`, `config` and `certificates` objects.
    pub namespace: String,

    /// Name of the secret holding private keys.
    pub keys_secret: String,

    /// Number of events the key store retains before rotating history.
    pub history_window: u64,

    /// Timeout for key-store resync listings. Long-poll waits are unbounded.
    pub request_timeout_secs: u64,

    /// Connect timeout for every registry request.
    pub connect_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            store_url: "http://127.0.0.1:2379".to_string(),
            key_prefix: "/registry".to_string(),
            namespace: "lb".to_string(),
            keys_secret: "keys".to_string(),
            history_window: 1000,
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

/// Rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Where the rendered proxy configuration is written.
    pub config_path: String,

    /// Directory receiving one `<name>.pem` bundle per certificate.
    pub ssl_dir: String,

    /// Username exposed to the template as `stats.username`.
    pub stats_username: String,

    /// Password exposed as `stats.password` (overridden by `STATISTICS_PASSWORD`).
    pub stats_password: Option<String>,

    /// Expose the process environment to the template as `env`.
    pub expose_env: bool,

    /// Delay before the first render so initial watch data can arrive.
    pub initial_settle_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            config_path: "haproxy.cfg".to_string(),
            ssl_dir: "ssl".to_string(),
            stats_username: "stats".to_string(),
            stats_password: None,
            expose_env: true,
            initial_settle_ms: 250,
        }
    }
}

/// Proxy process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy executable.
    pub binary: String,

    /// PID file the proxy writes and the reload reads for graceful handover.
    pub pid_file: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: "/usr/sbin/haproxy".to_string(),
            pid_file: "/run/haproxy.pid".to_string(),
        }
    }
}

/// Resilience configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// First retry delay.
    pub initial_backoff_secs: u64,

    /// Upper bound on the retry delay.
    pub max_backoff_secs: u64,

    /// Random jitter added on top of each delay, as a percentage (0 disables).
    pub jitter_percent: u8,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 1,
            max_backoff_secs: 32,
            jitter_percent: 0,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Default filter when `RUST_LOG` is unset.
    pub log_filter: String,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "lb_configurator=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}
