//! Load-balancer configurator library.
//!
//! Watches a cluster registry for pods, service definitions, TLS material and
//! a configuration template, renders the proxy configuration whenever the
//! result changes, and gracefully reloads the proxy.

// Inputs
pub mod config;
pub mod registry;

// Core engine
pub mod render;
pub mod snapshot;
pub mod watch;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ConfiguratorConfig;
pub use lifecycle::Shutdown;
pub use snapshot::{Snapshot, SnapshotStore};
