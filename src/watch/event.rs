//! Decoding registry changes into a closed set of events, and applying them.
//!
//! Both transports funnel through here: watched cluster objects via the
//! [`Watched`] impls, long-poll changes via [`decode_poll`]. [`apply`] is the
//! single exhaustive dispatch onto the snapshot store.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::RegistryConfig;
use crate::registry::types::{PollAction, PollEvent};
use crate::snapshot::{ServiceParseError, SnapshotStore};

/// Config map holding one JSON service descriptor per key.
pub const SERVICES_OBJECT: &str = "services";
/// Config map holding the template source.
pub const CONFIG_OBJECT: &str = "config";
/// Config map holding PEM certificates by name.
pub const CERTIFICATES_OBJECT: &str = "certificates";
/// Field of the config object holding the template.
pub const TEMPLATE_FIELD: &str = "template";

/// What happened to a pod.
#[derive(Debug, Clone, PartialEq)]
pub enum PodChange {
    Upsert(Box<Pod>),
    Delete,
}

/// A decoded registry change.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Pod {
        namespace: String,
        id: String,
        change: PodChange,
    },
    /// A complete pod listing as `(namespace, id, pod)`; replaces the index.
    PodListing(Vec<(String, String, Pod)>),
    /// Raw `services` data; `None` when the object was deleted.
    ServicesConfig(Option<BTreeMap<String, String>>),
    /// Template text; `None` when absent or deleted.
    Template(Option<String>),
    /// Certificates by name; `None` when the object was deleted.
    Certificates(Option<BTreeMap<String, String>>),
    /// Decoded keys by name; `None` when the secret was deleted.
    Keys(Option<BTreeMap<String, Vec<u8>>>),
    /// Anything the configurator does not track.
    Unknown(String),
}

impl RegistryEvent {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::Pod { .. } => "pod",
            RegistryEvent::PodListing(_) => "pods",
            RegistryEvent::ServicesConfig(_) => "services",
            RegistryEvent::Template(_) => "template",
            RegistryEvent::Certificates(_) => "certificates",
            RegistryEvent::Keys(_) => "keys",
            RegistryEvent::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid {kind} object: {reason}")]
    Object { kind: &'static str, reason: String },

    #[error("{kind} object is missing metadata.{field}")]
    MissingField { kind: &'static str, field: &'static str },

    #[error(transparent)]
    Services(#[from] ServiceParseError),
}

/// Where the configurator's own objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNames {
    pub namespace: String,
    pub keys_secret: String,
    pub key_prefix: String,
}

impl ObjectNames {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            keys_secret: config.keys_secret.clone(),
            key_prefix: config.key_prefix.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ObjectNames {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

/// A cluster object kind the streaming transport watches.
pub trait Watched: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Decode one added, modified or deleted object.
    fn change(self, names: &ObjectNames, deleted: bool) -> Result<RegistryEvent, DecodeError>;

    /// Events that replace this kind's whole slice of the store with a fresh
    /// listing. Anything the listing lacks is treated as deleted.
    fn relist(objects: Vec<Self>, names: &ObjectNames) -> Vec<RegistryEvent>;
}

impl Watched for Pod {
    fn change(self, _names: &ObjectNames, deleted: bool) -> Result<RegistryEvent, DecodeError> {
        let (namespace, id) = pod_identity(&self)?;
        let change = if deleted {
            PodChange::Delete
        } else {
            PodChange::Upsert(Box::new(self))
        };
        Ok(RegistryEvent::Pod { namespace, id, change })
    }

    fn relist(objects: Vec<Self>, _names: &ObjectNames) -> Vec<RegistryEvent> {
        let mut listing = Vec::with_capacity(objects.len());
        for pod in objects {
            match pod_identity(&pod) {
                Ok((namespace, id)) => listing.push((namespace, id, pod)),
                Err(e) => tracing::warn!(error = %e, "Skipping listed pod"),
            }
        }
        vec![RegistryEvent::PodListing(listing)]
    }
}

impl Watched for ConfigMap {
    fn change(self, names: &ObjectNames, deleted: bool) -> Result<RegistryEvent, DecodeError> {
        if self.metadata.namespace.as_deref().is_some_and(|ns| ns != names.namespace) {
            return Ok(RegistryEvent::Unknown("configmap/foreign".to_string()));
        }
        let name = self
            .metadata
            .name
            .ok_or(DecodeError::MissingField { kind: "ConfigMap", field: "name" })?;
        Ok(config_map_event(&name, self.data, deleted))
    }

    fn relist(objects: Vec<Self>, names: &ObjectNames) -> Vec<RegistryEvent> {
        let mut listed: BTreeMap<String, ConfigMap> = objects
            .into_iter()
            .filter(|cm| cm.metadata.namespace.as_deref().map_or(true, |ns| ns == names.namespace))
            .filter_map(|cm| Some((cm.metadata.name.clone()?, cm)))
            .collect();

        [SERVICES_OBJECT, CONFIG_OBJECT, CERTIFICATES_OBJECT]
            .into_iter()
            .map(|name| match listed.remove(name) {
                Some(cm) => config_map_event(name, cm.data, false),
                None => config_map_event(name, None, true),
            })
            .collect()
    }
}

impl Watched for Secret {
    fn change(self, names: &ObjectNames, deleted: bool) -> Result<RegistryEvent, DecodeError> {
        let in_namespace = self.metadata.namespace.as_deref().map_or(true, |ns| ns == names.namespace);
        if !in_namespace || self.metadata.name.as_deref() != Some(names.keys_secret.as_str()) {
            return Ok(RegistryEvent::Unknown("secret".to_string()));
        }
        Ok(keys_event(self, deleted))
    }

    fn relist(objects: Vec<Self>, names: &ObjectNames) -> Vec<RegistryEvent> {
        let keys = objects.into_iter().find(|secret| {
            secret.metadata.name.as_deref() == Some(names.keys_secret.as_str())
                && secret.metadata.namespace.as_deref().map_or(true, |ns| ns == names.namespace)
        });
        match keys {
            Some(secret) => vec![keys_event(secret, false)],
            None => vec![RegistryEvent::Keys(None)],
        }
    }
}

fn pod_identity(pod: &Pod) -> Result<(String, String), DecodeError> {
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .ok_or(DecodeError::MissingField { kind: "Pod", field: "namespace" })?;
    let id = pod
        .metadata
        .uid
        .clone()
        .ok_or(DecodeError::MissingField { kind: "Pod", field: "uid" })?;
    Ok((namespace, id))
}

/// Decode one long-poll change by its key path.
pub fn decode_poll(event: &PollEvent, names: &ObjectNames) -> Result<RegistryEvent, DecodeError> {
    let deleted = event.action == PollAction::Delete || event.value.is_none();
    let Some(relative) = event
        .key
        .strip_prefix(names.key_prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return Ok(RegistryEvent::Unknown(event.key.clone()));
    };
    let segments: Vec<&str> = relative.split('/').collect();

    match segments.as_slice() {
        ["pods", namespace, name] => {
            let change = match (&event.value, deleted) {
                (Some(value), false) => PodChange::Upsert(Box::new(parse_json("Pod", value)?)),
                _ => PodChange::Delete,
            };
            Ok(RegistryEvent::Pod {
                namespace: namespace.to_string(),
                id: name.to_string(),
                change,
            })
        }
        ["configmaps", namespace, name] if *namespace == names.namespace => {
            let data = match (&event.value, deleted) {
                (Some(value), false) => parse_json::<ConfigMap>("ConfigMap", value)?.data,
                _ => None,
            };
            Ok(config_map_event(name, data, deleted))
        }
        ["secrets", namespace, name] if *namespace == names.namespace && *name == names.keys_secret => {
            match (&event.value, deleted) {
                (Some(value), false) => Ok(keys_event(parse_json("Secret", value)?, false)),
                _ => Ok(RegistryEvent::Keys(None)),
            }
        }
        _ => Ok(RegistryEvent::Unknown(event.key.clone())),
    }
}

/// Apply a decoded event to the store. Returns true if state changed.
pub fn apply(store: &SnapshotStore, event: RegistryEvent) -> Result<bool, DecodeError> {
    let changed = match event {
        RegistryEvent::Pod { namespace, id, change: PodChange::Upsert(pod) } => {
            store.upsert_pod(&namespace, &id, *pod)
        }
        RegistryEvent::Pod { namespace, id, change: PodChange::Delete } => store.remove_pod(&namespace, &id),
        RegistryEvent::PodListing(listing) => store.replace_pods(listing),
        RegistryEvent::ServicesConfig(Some(raw)) => store.set_services_config(&raw)?,
        RegistryEvent::ServicesConfig(None) => store.clear_services(),
        RegistryEvent::Template(template) => store.set_template(template),
        RegistryEvent::Certificates(certs) => store.replace_certificates(
            certs
                .unwrap_or_default()
                .into_iter()
                .map(|(name, cert)| (name, cert.into_bytes()))
                .collect(),
        ),
        RegistryEvent::Keys(keys) => store.replace_keys(keys.unwrap_or_default()),
        RegistryEvent::Unknown(_) => false,
    };
    Ok(changed)
}

fn config_map_event(name: &str, data: Option<BTreeMap<String, String>>, deleted: bool) -> RegistryEvent {
    match name {
        SERVICES_OBJECT if deleted => RegistryEvent::ServicesConfig(None),
        SERVICES_OBJECT => RegistryEvent::ServicesConfig(Some(data.unwrap_or_default())),
        CONFIG_OBJECT if deleted => RegistryEvent::Template(None),
        CONFIG_OBJECT => RegistryEvent::Template(data.and_then(|mut d| d.remove(TEMPLATE_FIELD))),
        CERTIFICATES_OBJECT if deleted => RegistryEvent::Certificates(None),
        CERTIFICATES_OBJECT => RegistryEvent::Certificates(Some(data.unwrap_or_default())),
        other => RegistryEvent::Unknown(format!("configmap/{}", other)),
    }
}

fn keys_event(secret: Secret, deleted: bool) -> RegistryEvent {
    if deleted {
        return RegistryEvent::Keys(None);
    }
    let keys = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(name, bytes)| (name, bytes.0))
        .collect();
    RegistryEvent::Keys(Some(keys))
}

fn parse_json<T: serde::de::DeserializeOwned>(kind: &'static str, value: &str) -> Result<T, DecodeError> {
    serde_json::from_str(value).map_err(|e| DecodeError::Object { kind, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;

    fn object<T: DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    fn poll(action: PollAction, key: &str, value: Option<serde_json::Value>) -> PollEvent {
        PollEvent {
            action,
            key: key.to_string(),
            value: value.map(|v| v.to_string()),
            modified_index: 10,
            server_index: None,
        }
    }

    fn ready_pod(name: &str, namespace: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": namespace, "uid": format!("uid-{}", name), "labels": {"app": "api"}},
            "status": {"podIP": "10.0.0.2", "containerStatuses": [
                {"name": "app", "image": "app:1", "imageID": "", "restartCount": 0, "ready": true}
            ]}
        })
    }

    fn config_map(name: &str, data: serde_json::Value) -> ConfigMap {
        object(json!({"metadata": {"name": name, "namespace": "lb"}, "data": data}))
    }

    fn services_map() -> ConfigMap {
        config_map("services", json!({"api": "{\"namespace\":\"ns1\",\"selector\":{\"app\":\"api\"}}"}))
    }

    #[test]
    fn test_pod_change() {
        let names = ObjectNames::default();
        let pod: Pod = object(ready_pod("api-1", "ns1"));
        match pod.clone().change(&names, false).unwrap() {
            RegistryEvent::Pod { namespace, id, change: PodChange::Upsert(pod) } => {
                assert_eq!(namespace, "ns1");
                assert_eq!(id, "uid-api-1");
                assert_eq!(pod.metadata.name.as_deref(), Some("api-1"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let deleted = pod.change(&names, true).unwrap();
        assert!(matches!(deleted, RegistryEvent::Pod { change: PodChange::Delete, .. }));
    }

    #[test]
    fn test_pod_without_uid_fails() {
        let pod: Pod = object(json!({"metadata": {"name": "x", "namespace": "ns1"}}));
        let err = pod.change(&ObjectNames::default(), false).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "uid", .. }));
    }

    #[test]
    fn test_pod_relist_is_one_listing_without_anonymous_pods() {
        let pods: Vec<Pod> = vec![
            object(ready_pod("api-1", "ns1")),
            object(json!({"metadata": {"name": "x", "namespace": "ns1"}})),
        ];
        match Pod::relist(pods, &ObjectNames::default()).as_slice() {
            [RegistryEvent::PodListing(listing)] => {
                assert_eq!(listing.len(), 1);
                assert_eq!(listing[0].0, "ns1");
                assert_eq!(listing[0].1, "uid-api-1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_map_changes() {
        let names = ObjectNames::default();
        let event = services_map().change(&names, false).unwrap();
        assert!(matches!(&event, RegistryEvent::ServicesConfig(Some(data)) if data.contains_key("api")));
        assert_eq!(services_map().change(&names, true).unwrap(), RegistryEvent::ServicesConfig(None));

        let config = config_map("config", json!({"template": "global\n"}));
        assert_eq!(config.change(&names, false).unwrap(), RegistryEvent::Template(Some("global\n".into())));

        let other = config_map("unrelated", json!({}));
        assert!(matches!(other.change(&names, false).unwrap(), RegistryEvent::Unknown(_)));
    }

    #[test]
    fn test_config_map_relist_clears_missing_objects() {
        let names = ObjectNames::default();
        let events = ConfigMap::relist(vec![services_map(), config_map("unrelated", json!({}))], &names);

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], RegistryEvent::ServicesConfig(Some(data)) if data.contains_key("api")));
        assert_eq!(events[1], RegistryEvent::Template(None));
        assert_eq!(events[2], RegistryEvent::Certificates(None));
    }

    #[test]
    fn test_keys_secret() {
        let names = ObjectNames::default();
        let secret: Secret = object(json!({"metadata": {"name": "keys", "namespace": "lb"},
            "data": {"foo": BASE64.encode("KEYDATA")}}));
        let expected = BTreeMap::from([("foo".to_string(), b"KEYDATA".to_vec())]);
        assert_eq!(secret.clone().change(&names, false).unwrap(), RegistryEvent::Keys(Some(expected.clone())));
        assert_eq!(Secret::relist(vec![secret], &names), vec![RegistryEvent::Keys(Some(expected))]);

        let other: Secret = object(json!({"metadata": {"name": "tokens", "namespace": "lb"}}));
        assert!(matches!(other.clone().change(&names, false).unwrap(), RegistryEvent::Unknown(_)));
        assert_eq!(Secret::relist(vec![other], &names), vec![RegistryEvent::Keys(None)]);
    }

    #[test]
    fn test_decode_poll_paths() {
        let names = ObjectNames::default();

        let pod = decode_poll(&poll(PollAction::Set, "/registry/pods/ns1/api-1", Some(ready_pod("api-1", "ns1"))), &names).unwrap();
        assert!(matches!(&pod, RegistryEvent::Pod { id, change: PodChange::Upsert(_), .. } if id == "api-1"));

        let gone = decode_poll(&poll(PollAction::Delete, "/registry/pods/ns1/api-1", None), &names).unwrap();
        assert_eq!(
            gone,
            RegistryEvent::Pod { namespace: "ns1".into(), id: "api-1".into(), change: PodChange::Delete }
        );

        let certs = decode_poll(
            &poll(PollAction::Set, "/registry/configmaps/lb/certificates", Some(json!({"data": {"foo": "CERTDATA"}}))),
            &names,
        )
        .unwrap();
        assert_eq!(
            certs,
            RegistryEvent::Certificates(Some(BTreeMap::from([("foo".to_string(), "CERTDATA".to_string())])))
        );

        let keys = decode_poll(
            &poll(PollAction::Set, "/registry/secrets/lb/keys", Some(json!({"data": {"foo": BASE64.encode("K")}}))),
            &names,
        )
        .unwrap();
        assert_eq!(keys, RegistryEvent::Keys(Some(BTreeMap::from([("foo".to_string(), b"K".to_vec())]))));

        let keys = decode_poll(&poll(PollAction::Delete, "/registry/secrets/lb/keys", None), &names).unwrap();
        assert_eq!(keys, RegistryEvent::Keys(None));

        for key in [
            "/registry/configmaps/other/services",
            "/registry/secrets/lb/tokens",
            "/registry/services/specs/default/kubernetes",
            "/elsewhere/pods/ns1/a",
        ] {
            let event = decode_poll(&poll(PollAction::Set, key, Some(json!({}))), &names).unwrap();
            assert!(matches!(event, RegistryEvent::Unknown(_)), "{} should be ignored", key);
        }
    }

    #[test]
    fn test_decode_poll_malformed_objects() {
        let names = ObjectNames::default();
        let mut event = poll(PollAction::Set, "/registry/pods/ns1/api-1", None);
        event.value = Some("{truncated".into());
        assert!(matches!(
            decode_poll(&event, &names).unwrap_err(),
            DecodeError::Object { kind: "Pod", .. }
        ));

        let bad_keys = poll(PollAction::Set, "/registry/secrets/lb/keys", Some(json!({"data": {"foo": "%%%"}})));
        assert!(matches!(
            decode_poll(&bad_keys, &names).unwrap_err(),
            DecodeError::Object { kind: "Secret", .. }
        ));
    }

    #[test]
    fn test_apply_scenario() {
        let names = ObjectNames::default();
        let store = SnapshotStore::new();

        apply(&store, services_map().change(&names, false).unwrap()).unwrap();
        let pod: Pod = object(ready_pod("api-1", "ns1"));
        apply(&store, pod.change(&names, false).unwrap()).unwrap();

        let snapshot = store.read_snapshot();
        let api = snapshot.service("api").unwrap();
        assert_eq!(api.pods.len(), 1);

        let mut unready = ready_pod("api-1", "ns1");
        unready["status"]["containerStatuses"][0]["ready"] = json!(false);
        let unready: Pod = object(unready);
        apply(&store, unready.change(&names, false).unwrap()).unwrap();
        assert!(store.read_snapshot().service("api").unwrap().pods.is_empty());
    }

    #[test]
    fn test_apply_pod_listing_replaces_index() {
        let names = ObjectNames::default();
        let store = SnapshotStore::new();
        apply(&store, services_map().change(&names, false).unwrap()).unwrap();
        let stale: Pod = object(ready_pod("api-1", "ns1"));
        apply(&store, stale.change(&names, false).unwrap()).unwrap();

        for event in Pod::relist(vec![object(ready_pod("api-2", "ns1"))], &names) {
            apply(&store, event).unwrap();
        }

        let snapshot = store.read_snapshot();
        assert_eq!(snapshot.service("api").unwrap().pods.keys().collect::<Vec<_>>(), vec!["api-2"]);
        assert_eq!(store.pod_count(), 1);
    }

    #[test]
    fn test_apply_bad_services_is_decode_error() {
        let store = SnapshotStore::new();
        let raw = BTreeMap::from([("api".to_string(), "nope".to_string())]);
        let err = apply(&store, RegistryEvent::ServicesConfig(Some(raw))).unwrap_err();
        assert!(matches!(err, DecodeError::Services(_)));
        assert!(store.read_snapshot().services.is_none());
    }
}
