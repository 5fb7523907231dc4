//! Streaming watch drivers.
//!
//! Each driver runs one `kube` watcher and feeds decoded events into the
//! snapshot store. Every run starts with a full listing that replaces the
//! driver's slice of the store, so objects deleted while no watch was open
//! do not survive a restart. A driver returns when its watch fails;
//! restarting it is the supervisor's job.

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::runtime::watcher::{self, watcher, Event};
use kube::Api;

use crate::observability::metrics;
use crate::registry::{ClusterClient, RegistryError};
use crate::snapshot::SnapshotStore;
use crate::watch::event::{apply, DecodeError, ObjectNames, RegistryEvent, Watched};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Pods,
    ConfigMaps,
    KeysSecret,
}

/// A single long-lived watch feeding the store.
pub struct WatchDriver {
    target: Target,
    client: ClusterClient,
    store: Arc<SnapshotStore>,
    names: ObjectNames,
}

impl WatchDriver {
    /// Watches every pod in the cluster.
    pub fn pods(client: ClusterClient, store: Arc<SnapshotStore>, names: ObjectNames) -> Self {
        Self::new(Target::Pods, client, store, names)
    }

    /// Watches the config maps of the configurator's namespace
    /// (`services`, `config`, `certificates`).
    pub fn config_maps(client: ClusterClient, store: Arc<SnapshotStore>, names: ObjectNames) -> Self {
        Self::new(Target::ConfigMaps, client, store, names)
    }

    /// Watches the secret holding the TLS keys.
    pub fn secret(client: ClusterClient, store: Arc<SnapshotStore>, names: ObjectNames) -> Self {
        Self::new(Target::KeysSecret, client, store, names)
    }

    fn new(target: Target, client: ClusterClient, store: Arc<SnapshotStore>, names: ObjectNames) -> Self {
        Self {
            target,
            client,
            store,
            names,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.target {
            Target::Pods => "pods",
            Target::ConfigMaps => "configmaps",
            Target::KeysSecret => "secret",
        }
    }

    /// List, replace this driver's slice of the store, then follow changes.
    ///
    /// Malformed events are logged and skipped. Any other watch failure,
    /// including an error reported by the server, ends the run.
    pub async fn run(&self) -> Result<(), RegistryError> {
        match self.target {
            Target::Pods => self.follow::<Pod>(self.client.pods(), watcher::Config::default()).await,
            Target::ConfigMaps => {
                self.follow::<ConfigMap>(self.client.config_maps(), watcher::Config::default())
                    .await
            }
            Target::KeysSecret => {
                let selector = format!("metadata.name={}", self.names.keys_secret);
                self.follow::<Secret>(self.client.secrets(), watcher::Config::default().fields(&selector))
                    .await
            }
        }
    }

    async fn follow<K: Watched>(&self, api: Api<K>, config: watcher::Config) -> Result<(), RegistryError> {
        tracing::info!(driver = self.name(), url = api.resource_url(), "Watch started");
        let events = watcher(api, config);
        tokio::pin!(events);

        let mut listing: Vec<K> = Vec::new();
        while let Some(item) = events.next().await {
            match item {
                Ok(Event::Init) => listing.clear(),
                Ok(Event::InitApply(object)) => listing.push(object),
                Ok(Event::InitDone) => {
                    let objects = std::mem::take(&mut listing);
                    tracing::info!(driver = self.name(), objects = objects.len(), "Listing replaced");
                    for event in K::relist(objects, &self.names) {
                        self.apply(Ok(event));
                    }
                }
                Ok(Event::Apply(object)) => self.apply(object.change(&self.names, false)),
                Ok(Event::Delete(object)) => self.apply(object.change(&self.names, true)),
                Err(watcher::Error::WatchFailed(kube::Error::SerdeError(e))) => {
                    metrics::record_decode_error(self.name());
                    tracing::warn!(driver = self.name(), error = %e, "Skipping malformed watch event");
                }
                Err(source) => {
                    return Err(RegistryError::Watch {
                        resource: self.name(),
                        source,
                    })
                }
            }
        }

        tracing::info!(driver = self.name(), "Watch stream ended");
        Ok(())
    }

    fn apply(&self, decoded: Result<RegistryEvent, DecodeError>) {
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::record_decode_error(self.name());
                tracing::warn!(driver = self.name(), error = %e, "Skipping undecodable event");
                return;
            }
        };

        let kind = decoded.kind();
        match apply(&self.store, decoded) {
            Ok(changed) => {
                metrics::record_event_applied(kind);
                tracing::debug!(driver = self.name(), kind, changed, "Applied event");
            }
            Err(e) => {
                metrics::record_decode_error(self.name());
                tracing::warn!(driver = self.name(), kind, error = %e, "Rejected event");
            }
        }
    }
}
