//! Cluster API access for the streaming transport.
//!
//! Wraps a `kube` client pointed at the configured API base. Watches are
//! opened by the drivers through the typed [`Api`] handles returned here.

use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::{Api, Client, Config};

use crate::config::RegistryConfig;
use crate::registry::error::{RegistryError, RegistryResult};

/// Typed access to the objects the configurator reads from the cluster.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    namespace: String,
}

impl ClusterClient {
    /// Build a client for `config.base_url`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        url::Url::parse(&config.base_url)?;
        let cluster_url = config
            .base_url
            .parse::<http::Uri>()
            .map_err(|source| RegistryError::ClusterUrl {
                url: config.base_url.clone(),
                source,
            })?;

        let mut kube_config = Config::new(cluster_url);
        kube_config.default_namespace = config.namespace.clone();
        kube_config.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));

        Ok(Self {
            client: Client::try_from(kube_config)?,
            namespace: config.namespace.clone(),
        })
    }

    /// Every pod in the cluster.
    pub fn pods(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    /// Config maps of the configurator's namespace.
    pub fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Secrets of the configurator's namespace.
    pub fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Point read of one config map.
    pub async fn config_map(&self, name: &str) -> RegistryResult<ConfigMap> {
        self.config_maps()
            .get_opt(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("{}/configmaps/{}", self.namespace, name)))
    }

    /// Point read of one secret.
    pub async fn secret(&self, name: &str) -> RegistryResult<Secret> {
        self.secrets()
            .get_opt(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("{}/secrets/{}", self.namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_base_rejected() {
        let result = ClusterClient::new(&RegistryConfig {
            base_url: "::not-a-url".into(),
            ..RegistryConfig::default()
        });
        assert!(matches!(result, Err(RegistryError::Url(_))));
    }

    #[tokio::test]
    async fn test_namespaced_handles() {
        let client = ClusterClient::new(&RegistryConfig {
            namespace: "edge".into(),
            ..RegistryConfig::default()
        })
        .unwrap();
        assert_eq!(client.config_maps().resource_url(), "/api/v1/namespaces/edge/configmaps");
        assert_eq!(client.secrets().resource_url(), "/api/v1/namespaces/edge/secrets");
        assert_eq!(client.pods().resource_url(), "/api/v1/pods");
    }
}
