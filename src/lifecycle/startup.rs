//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry clients, render pipeline and drivers from config
//! - Start the metrics exporter when enabled
//! - Run the selected transport until shutdown
//!
//! # Design Decisions
//! - Fail fast: a bad URL or unresolvable output path is fatal at startup
//! - After startup nothing is fatal; failures are retried under supervision
//! - The render loop starts after a short settle delay so initial watch data
//!   lands before the first render

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfiguratorConfig, Transport};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{ClusterClient, RegistryError, StoreClient};
use crate::render::{FsWriter, HaproxyReloader, JinjaEngine, RenderPipeline, StatsCredentials};
use crate::resilience::{supervise, BackoffPolicy};
use crate::snapshot::SnapshotStore;
use crate::watch::{ObjectNames, UpdateDriver, WatchDriver};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("cannot resolve output paths: {0}")]
    OutputPath(#[from] std::io::Error),

    #[error("--once needs the poll transport")]
    OnceNeedsPoll,
}

/// Build the production render pipeline: Jinja templates, filesystem
/// output and HAProxy reloads.
pub fn build_pipeline(config: &ConfiguratorConfig) -> Result<RenderPipeline, StartupError> {
    let writer = FsWriter::new(&config.render.config_path, &config.render.ssl_dir)?;
    Ok(RenderPipeline::new(
        Box::new(JinjaEngine::new()),
        Box::new(writer),
        Box::new(HaproxyReloader::new(&config.proxy)),
        StatsCredentials {
            username: config.render.stats_username.clone(),
            password: config.render.stats_password.clone(),
        },
        config.render.expose_env,
    ))
}

/// Run the configurator until `shutdown` fires.
///
/// With `once`, performs a single resync and render and returns.
pub async fn run(config: ConfiguratorConfig, once: bool, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = build_pipeline(&config)?;
    let names = ObjectNames::from_config(&config.registry);
    let policy = BackoffPolicy::from_config(&config.resilience);

    tracing::info!(
        transport = ?config.transport,
        cluster = %config.registry.base_url,
        store = %config.registry.store_url,
        namespace = %names.namespace,
        config_path = %config.render.config_path,
        "Configurator starting"
    );

    match (config.transport, once) {
        (Transport::Poll, true) => {
            let client = StoreClient::new(&config.registry)?;
            let mut driver = UpdateDriver::new(client, names, pipeline, policy, config.registry.history_window);
            driver.run_once().await?;
            Ok(())
        }
        (Transport::Stream, true) => Err(StartupError::OnceNeedsPoll),
        (Transport::Poll, false) => {
            let client = StoreClient::new(&config.registry)?;
            let driver = UpdateDriver::new(client, names, pipeline, policy, config.registry.history_window);
            driver.run(shutdown.subscribe()).await;
            Ok(())
        }
        (Transport::Stream, false) => {
            let client = ClusterClient::new(&config.registry)?;
            let settle = Duration::from_millis(config.render.initial_settle_ms);
            run_streaming(client, names, pipeline, policy, settle, shutdown).await;
            Ok(())
        }
    }
}

/// Spawn one supervised task per watch driver plus the render loop, then
/// wait for all of them to stop.
pub async fn run_streaming(
    client: ClusterClient,
    names: ObjectNames,
    pipeline: RenderPipeline,
    policy: BackoffPolicy,
    settle: Duration,
    shutdown: &Shutdown,
) {
    let store = Arc::new(SnapshotStore::new());
    let mut shutdown_rx = shutdown.subscribe();

    let drivers = [
        WatchDriver::pods(client.clone(), store.clone(), names.clone()),
        WatchDriver::config_maps(client.clone(), store.clone(), names.clone()),
        WatchDriver::secret(client, store.clone(), names),
    ];
    let mut tasks: Vec<JoinHandle<()>> = drivers
        .into_iter()
        .map(|driver| spawn_supervised(driver, policy, shutdown))
        .collect();

    let render_rx = shutdown.subscribe();
    tokio::select! {
        _ = tokio::time::sleep(settle) => {}
        _ = shutdown_rx.recv() => {}
    }
    tasks.push(tokio::spawn(pipeline.run(store, render_rx)));

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Task panicked");
        }
    }
    tracing::info!("All tasks stopped");
}

fn spawn_supervised(driver: WatchDriver, policy: BackoffPolicy, shutdown: &Shutdown) -> JoinHandle<()> {
    let rx = shutdown.subscribe();
    let driver = Arc::new(driver);
    tokio::spawn(async move {
        let name = driver.name();
        supervise(name, policy, rx, move || {
            let driver = driver.clone();
            async move { driver.run().await }
        })
        .await
    })
}
