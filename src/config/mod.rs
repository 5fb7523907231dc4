//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, apply K8SBASE / STATISTICS_PASSWORD)
//!     → validation.rs (semantic checks)
//!     → ConfiguratorConfig (validated, immutable)
//!     → handed to startup, which builds the client, drivers and pipeline
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults so the binary runs with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ConfiguratorConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::RegistryConfig;
pub use schema::RenderConfig;
pub use schema::ResilienceConfig;
pub use schema::Transport;
