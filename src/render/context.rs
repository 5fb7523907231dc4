//! The structured context handed to the template.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::registry::Pod;
use crate::snapshot::Snapshot;

/// Credentials for the proxy's statistics page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsCredentials {
    pub username: String,
    pub password: Option<String>,
}

/// One service as the template sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceContext {
    pub name: String,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
    pub pods: BTreeMap<String, Pod>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Template input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub stats: StatsCredentials,
    /// Sorted by name.
    pub services: Vec<ServiceContext>,
    /// Names with both a certificate and a key.
    pub certificates: Vec<String>,
    /// Absolute directory holding the certificate bundles.
    pub ssldir: String,
    pub env: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn build(
        snapshot: &Snapshot,
        stats: StatsCredentials,
        deployable: Vec<String>,
        ssldir: String,
        env: BTreeMap<String, String>,
    ) -> Self {
        let services = snapshot
            .services
            .iter()
            .flatten()
            .map(|service| ServiceContext {
                name: service.name.clone(),
                namespace: service.descriptor.namespace.clone(),
                selector: service.descriptor.selector.clone(),
                pods: service.pods.clone(),
                extra: service
                    .descriptor
                    .extra
                    .iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "name" | "pods"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            })
            .collect();

        Self {
            stats,
            services,
            certificates: deployable,
            ssldir,
            env,
        }
    }
}
