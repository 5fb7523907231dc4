//! The authoritative in-memory view of pods, services, TLS material and template.
//!
//! # Responsibilities
//! - Index ready pods by namespace
//! - Keep every service's pod set equal to the ready pods matching its selector
//! - Merge certificate and key halves by name
//! - Hand the render loop a consistent, owned snapshot
//!
//! # Design Decisions
//! - One mutex around each compound mutation (pod upsert + service rescan is one unit)
//! - Every state change signals the shared [`ChangeNotifier`] after the lock is released
//! - No-op mutations (same pod re-sent, identical config) do not signal

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::lifecycle::notifier::ChangeNotifier;
use crate::registry::Pod;
use crate::snapshot::certs::{CertificatePair, CertificateTable};
use crate::snapshot::readiness::{is_ready, matches};

/// One entry of the `services` object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceDescriptor {
    pub namespace: String,

    #[serde(default)]
    pub selector: BTreeMap<String, String>,

    /// Any other descriptor fields, passed through to the template.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A services entry that did not parse.
#[derive(Debug, Error)]
#[error("service '{service}': {reason}")]
pub struct ServiceParseError {
    pub service: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct MemberPod {
    id: String,
    pod: Pod,
}

#[derive(Debug, Clone)]
struct ServiceState {
    descriptor: ServiceDescriptor,
    /// Keyed by pod name.
    pods: BTreeMap<String, MemberPod>,
}

#[derive(Debug, Default)]
struct StoreState {
    /// namespace → pod identity → pod. Only ready pods are kept.
    pods: HashMap<String, BTreeMap<String, Pod>>,
    /// `None` until the services object has been seen.
    services: Option<BTreeMap<String, ServiceState>>,
    certificates: CertificateTable,
    template: Option<String>,
}

/// A service as the render loop sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceView {
    pub name: String,
    pub descriptor: ServiceDescriptor,
    pub pods: BTreeMap<String, Pod>,
}

/// Immutable point-in-time view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Sorted by name. `None` until the services object has been seen.
    pub services: Option<Vec<ServiceView>>,
    /// Complete pairs only, sorted by name.
    pub certificates: Vec<CertificatePair>,
    pub template: Option<String>,
}

impl Snapshot {
    /// Both the template and the services object are known.
    pub fn is_renderable(&self) -> bool {
        self.template.is_some() && self.services.is_some()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceView> {
        self.services.as_ref()?.iter().find(|s| s.name == name)
    }
}

/// Thread-safe snapshot store shared by watch drivers and the render loop.
#[derive(Debug)]
pub struct SnapshotStore {
    state: Mutex<StoreState>,
    notifier: Arc<ChangeNotifier>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_notifier(Arc::new(ChangeNotifier::new()))
    }

    pub fn with_notifier(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A panic in another holder cannot leave a half-applied mutation
        // visible: every mutation builds its result before writing it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn changed(&self, changed: bool) -> bool {
        if changed {
            self.notifier.signal();
        }
        changed
    }

    /// Insert or replace a pod. A pod that is not ready is removed instead.
    ///
    /// `id` is the pod's identity within its namespace (uid or name depending
    /// on transport). Returns true if anything changed.
    pub fn upsert_pod(&self, namespace: &str, id: &str, pod: Pod) -> bool {
        if !is_ready(&pod) {
            return self.remove_pod(namespace, id);
        }

        let name = pod_name(&pod, id).to_string();
        let mut state = self.lock();
        let StoreState { pods, services, .. } = &mut *state;

        let bucket = pods.entry(namespace.to_string()).or_default();
        if bucket.get(id) == Some(&pod) {
            return false;
        }
        let renamed_from = bucket
            .insert(id.to_string(), pod.clone())
            .map(|previous| pod_name(&previous, id).to_string())
            .filter(|old| *old != name);

        if let Some(services) = services.as_mut() {
            let bucket = pods.get(namespace);
            for service in services
                .values_mut()
                .filter(|s| s.descriptor.namespace == namespace)
            {
                if let Some(old) = &renamed_from {
                    evict(service, bucket, old, id);
                }
                if matches(&service.descriptor.selector, &pod) {
                    service.pods.insert(
                        name.clone(),
                        MemberPod {
                            id: id.to_string(),
                            pod: pod.clone(),
                        },
                    );
                } else {
                    evict(service, bucket, &name, id);
                }
            }
        }

        drop(state);
        self.changed(true)
    }

    /// Remove a pod from the index and from every service that included it.
    pub fn remove_pod(&self, namespace: &str, id: &str) -> bool {
        let mut state = self.lock();
        let StoreState { pods, services, .. } = &mut *state;

        let removed = pods.get_mut(namespace).and_then(|bucket| bucket.remove(id));
        if pods.get(namespace).is_some_and(BTreeMap::is_empty) {
            pods.remove(namespace);
        }

        let mut changed = removed.is_some();
        if let Some(services) = services.as_mut() {
            let bucket = pods.get(namespace);
            for service in services
                .values_mut()
                .filter(|s| s.descriptor.namespace == namespace)
            {
                let held: Vec<String> = service
                    .pods
                    .iter()
                    .filter(|(_, member)| member.id == id)
                    .map(|(name, _)| name.clone())
                    .collect();
                for name in held {
                    changed |= evict(service, bucket, &name, id);
                }
            }
        }

        drop(state);
        self.changed(changed)
    }

    /// Replace the whole pod index with a fresh listing of
    /// `(namespace, id, pod)` and re-derive every service's pods.
    ///
    /// Pods absent from the listing are gone afterwards, whatever the store
    /// saw before. Pods that are not ready are dropped.
    pub fn replace_pods(&self, listing: Vec<(String, String, Pod)>) -> bool {
        let mut index: HashMap<String, BTreeMap<String, Pod>> = HashMap::new();
        for (namespace, id, pod) in listing {
            if is_ready(&pod) {
                index.entry(namespace).or_default().insert(id, pod);
            }
        }

        let mut state = self.lock();
        if state.pods == index {
            return false;
        }
        state.pods = index;

        let StoreState { pods, services, .. } = &mut *state;
        for service in services.iter_mut().flat_map(|s| s.values_mut()) {
            service.pods = derive_members(pods, &service.descriptor);
        }

        drop(state);
        self.changed(true)
    }

    /// Replace the whole services table from the raw `services` object.
    ///
    /// Every value must parse as a [`ServiceDescriptor`]; if any entry fails
    /// the current table is kept. Each service's pods are re-derived from the
    /// full pod index.
    pub fn set_services_config(&self, raw: &BTreeMap<String, String>) -> Result<bool, ServiceParseError> {
        let mut descriptors = BTreeMap::new();
        for (name, value) in raw {
            let descriptor: ServiceDescriptor =
                serde_json::from_str(value).map_err(|e| ServiceParseError {
                    service: name.clone(),
                    reason: e.to_string(),
                })?;
            descriptors.insert(name.clone(), descriptor);
        }

        let mut state = self.lock();
        let services = descriptors
            .into_iter()
            .map(|(name, descriptor)| {
                let pods = derive_members(&state.pods, &descriptor);
                (name, ServiceState { descriptor, pods })
            })
            .collect();
        state.services = Some(services);

        drop(state);
        Ok(self.changed(true))
    }

    /// Forget the services object (it was deleted).
    pub fn clear_services(&self) -> bool {
        let changed = self.lock().services.take().is_some();
        self.changed(changed)
    }

    pub fn set_certificate_half(&self, name: &str, cert: Option<Vec<u8>>) -> bool {
        let changed = self.lock().certificates.set_cert(name, cert);
        self.changed(changed)
    }

    pub fn set_key_half(&self, name: &str, key: Option<Vec<u8>>) -> bool {
        let changed = self.lock().certificates.set_key(name, key);
        self.changed(changed)
    }

    /// Replace all certificate halves with the contents of the certificates object.
    pub fn replace_certificates(&self, certs: BTreeMap<String, Vec<u8>>) -> bool {
        let changed = self.lock().certificates.replace_certs(certs);
        self.changed(changed)
    }

    /// Replace all key halves with the contents of the keys secret.
    pub fn replace_keys(&self, keys: BTreeMap<String, Vec<u8>>) -> bool {
        let changed = self.lock().certificates.replace_keys(keys);
        self.changed(changed)
    }

    pub fn set_template(&self, template: Option<String>) -> bool {
        let mut state = self.lock();
        let changed = state.template != template;
        state.template = template;
        drop(state);
        self.changed(changed)
    }

    /// Owned, consistent copy of the current state.
    pub fn read_snapshot(&self) -> Snapshot {
        let state = self.lock();
        let services = state.services.as_ref().map(|services| {
            services
                .iter()
                .map(|(name, service)| ServiceView {
                    name: name.clone(),
                    descriptor: service.descriptor.clone(),
                    pods: service
                        .pods
                        .iter()
                        .map(|(pod_name, member)| (pod_name.clone(), member.pod.clone()))
                        .collect(),
                })
                .collect()
        });

        Snapshot {
            services,
            certificates: state.certificates.complete_pairs(),
            template: state.template.clone(),
        }
    }

    /// Number of ready pods currently indexed.
    pub fn pod_count(&self) -> usize {
        self.lock().pods.values().map(BTreeMap::len).sum()
    }
}

fn pod_name<'a>(pod: &'a Pod, id: &'a str) -> &'a str {
    pod.metadata.name.as_deref().unwrap_or(id)
}

/// Drop `id` from the member slot `name`. Another ready pod of the same name
/// that still matches the selector takes the slot over.
fn evict(
    service: &mut ServiceState,
    bucket: Option<&BTreeMap<String, Pod>>,
    name: &str,
    id: &str,
) -> bool {
    if !service.pods.get(name).is_some_and(|m| m.id == id) {
        return false;
    }
    service.pods.remove(name);

    let successor = bucket.into_iter().flatten().find(|(other, pod)| {
        other.as_str() != id && pod_name(pod, other) == name && matches(&service.descriptor.selector, pod)
    });
    if let Some((other, pod)) = successor {
        service.pods.insert(
            name.to_string(),
            MemberPod {
                id: other.clone(),
                pod: pod.clone(),
            },
        );
    }
    true
}

fn derive_members(
    pods: &HashMap<String, BTreeMap<String, Pod>>,
    descriptor: &ServiceDescriptor,
) -> BTreeMap<String, MemberPod> {
    let Some(bucket) = pods.get(&descriptor.namespace) else {
        return BTreeMap::new();
    };
    bucket
        .iter()
        .filter(|(_, pod)| matches(&descriptor.selector, pod))
        .map(|(id, pod)| {
            (
                pod_name(pod, id).to_string(),
                MemberPod {
                    id: id.clone(),
                    pod: pod.clone(),
                },
            )
        })
        .collect()
}
