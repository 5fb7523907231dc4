//! Load-balancer configurator.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                        LB CONFIGURATOR                            │
//!   │                                                                   │
//!   │  registry ──▶ watch drivers ──▶ snapshot store ──▶ notifier       │
//!   │  (stream or      (pods, config     (services ↔ ready pods,   │    │
//!   │   long-poll)      maps, secret)     cert ↔ key, template)    │    │
//!   │                                                               ▼    │
//!   │                         render loop: context → template → hash     │
//!   │                              → write on change → proxy reload      │
//!   │                                                                   │
//!   │  cross-cutting: config · resilience (backoff, supervision,        │
//!   │                 staleness) · lifecycle · observability            │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lb_configurator::config::validation::validate_config;
use lb_configurator::config::{load_config, ConfigError, ConfiguratorConfig, Transport};
use lb_configurator::lifecycle::{signals, startup, Shutdown};
use lb_configurator::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "lb-configurator")]
#[command(about = "Renders proxy configuration from cluster registry state", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured transport.
    #[arg(short, long, value_enum)]
    transport: Option<Transport>,

    /// Override the registry API base URL.
    #[arg(long)]
    registry_url: Option<String>,

    /// Resync, render once and exit (poll transport).
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn apply(&self, config: &mut ConfiguratorConfig) {
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(url) = &self.registry_url {
            config.registry.base_url = url.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lb-configurator starting");

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    startup::run(config, cli.once, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
