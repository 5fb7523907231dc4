//! Render and reload subsystem.
//!
//! # Data Flow
//! ```text
//! ChangeNotifier.wait_and_clear()
//!     → SnapshotStore.read_snapshot()
//!     → context.rs (stats, services, certificates, ssldir, env)
//!     → template.rs (template + context → text)
//!     → SHA-512 compare → output.rs (write config / <ssldir>/<name>.pem on change)
//!     → reload.rs (proxy reload if anything was written)
//! ```
//!
//! # Design Decisions
//! - Writes happen only when content hashes differ from the last successful write
//! - A hash is recorded only after its write succeeded, so failures retry next cycle
//! - Reload failures are logged and counted, never propagated

pub mod context;
pub mod output;
pub mod reload;
pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sha2::{Digest, Sha512};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::snapshot::{Snapshot, SnapshotStore};

pub use context::{RenderContext, StatsCredentials};
pub use output::{is_safe_certificate_name, ArtifactWriter, FsWriter, WriteError};
pub use reload::{HaproxyReloader, ProxyReloader, ReloadError};
pub use template::{JinjaEngine, TemplateEngine};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(String),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// What one render cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The template or the services object has not been seen yet.
    NotReady,
    /// Output identical to what is already on disk.
    Unchanged,
    /// At least one file was written and a reload was attempted.
    Reloaded {
        config_written: bool,
        certificates_written: usize,
    },
}

/// Renders snapshots to disk and reloads the proxy when output changes.
pub struct RenderPipeline {
    engine: Box<dyn TemplateEngine>,
    writer: Box<dyn ArtifactWriter>,
    reloader: Box<dyn ProxyReloader>,
    stats: StatsCredentials,
    expose_env: bool,
    config_hash: Option<Vec<u8>>,
    certificate_hashes: HashMap<String, Vec<u8>>,
}

impl RenderPipeline {
    pub fn new(
        engine: Box<dyn TemplateEngine>,
        writer: Box<dyn ArtifactWriter>,
        reloader: Box<dyn ProxyReloader>,
        stats: StatsCredentials,
        expose_env: bool,
    ) -> Self {
        Self {
            engine,
            writer,
            reloader,
            stats,
            expose_env,
            config_hash: None,
            certificate_hashes: HashMap::new(),
        }
    }

    /// Render one snapshot, write what changed and reload if needed.
    pub async fn run_cycle(&mut self, snapshot: &Snapshot) -> Result<CycleOutcome, RenderError> {
        let (Some(template), Some(services)) = (&snapshot.template, &snapshot.services) else {
            tracing::debug!(
                template = snapshot.template.is_some(),
                services = snapshot.services.is_some(),
                "Skipping render until template and services are known"
            );
            return Ok(CycleOutcome::NotReady);
        };

        let pairs: Vec<_> = snapshot
            .certificates
            .iter()
            .filter(|pair| {
                let safe = is_safe_certificate_name(&pair.name);
                if !safe {
                    tracing::warn!(name = %pair.name, "Refusing certificate with unsafe name");
                }
                safe
            })
            .collect();

        let context = RenderContext::build(
            snapshot,
            self.stats.clone(),
            pairs.iter().map(|pair| pair.name.clone()).collect(),
            self.writer.ssl_dir().display().to_string(),
            self.environment(),
        );
        let rendered = self.engine.render(template, &context)?;

        let mut config_written = false;
        let config_hash = Sha512::digest(rendered.as_bytes()).to_vec();
        if self.config_hash.as_ref() != Some(&config_hash) {
            self.writer.write_config(&rendered)?;
            self.config_hash = Some(config_hash);
            config_written = true;
            tracing::info!(path = %self.writer.config_path().display(), "Wrote proxy configuration");
        }

        let mut certificates_written = 0;
        for pair in &pairs {
            let mut bundle = Vec::with_capacity(pair.key.len() + pair.cert.len());
            bundle.extend_from_slice(&pair.key);
            bundle.extend_from_slice(&pair.cert);

            let hash = Sha512::digest(&bundle).to_vec();
            if self.certificate_hashes.get(&pair.name) == Some(&hash) {
                continue;
            }
            match self.writer.write_certificate(&pair.name, &bundle) {
                Ok(()) => {
                    self.certificate_hashes.insert(pair.name.clone(), hash);
                    certificates_written += 1;
                    tracing::info!(name = %pair.name, "Wrote certificate bundle");
                }
                Err(e) => tracing::error!(name = %pair.name, error = %e, "Certificate write failed"),
            }
        }
        self.certificate_hashes
            .retain(|name, _| pairs.iter().any(|pair| &pair.name == name));

        metrics::record_snapshot_size(services.len(), pairs.len());

        if !config_written && certificates_written == 0 {
            return Ok(CycleOutcome::Unchanged);
        }

        match self.reloader.reload(self.writer.config_path()).await {
            Ok(()) => {
                metrics::record_reload(true);
                tracing::info!("Proxy reloaded");
            }
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(error = %e, "Proxy reload failed");
            }
        }

        Ok(CycleOutcome::Reloaded {
            config_written,
            certificates_written,
        })
    }

    /// Run a cycle and log its result. Errors never escape.
    pub async fn render(&mut self, snapshot: &Snapshot) {
        match self.run_cycle(snapshot).await {
            Ok(CycleOutcome::NotReady) => metrics::record_render("not_ready"),
            Ok(CycleOutcome::Unchanged) => {
                metrics::record_render("unchanged");
                tracing::debug!("Rendered output unchanged");
            }
            Ok(CycleOutcome::Reloaded { .. }) => metrics::record_render("changed"),
            Err(e) => {
                metrics::record_render("failed");
                tracing::error!(error = %e, "Render cycle failed");
            }
        }
    }

    /// Render whenever the store signals a change, until shutdown.
    pub async fn run(mut self, store: Arc<SnapshotStore>, mut shutdown: broadcast::Receiver<()>) {
        let notifier = store.notifier().clone();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Render loop shutting down");
                    return;
                }
                _ = notifier.wait_and_clear() => {}
            }
            let snapshot = store.read_snapshot();
            self.render(&snapshot).await;
        }
    }

    fn environment(&self) -> BTreeMap<String, String> {
        if self.expose_env {
            std::env::vars().collect()
        } else {
            BTreeMap::new()
        }
    }
}
