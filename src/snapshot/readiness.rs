//! Pod readiness and label selector matching.
//!
//! # Design Decisions
//! - Pure predicates, no state
//! - Selector pairs combine with AND semantics
//! - Empty selector = matches every ready pod (carried over as observed)

use std::collections::BTreeMap;

use crate::registry::Pod;

/// A pod is ready when it has an IP and every one of at least one container
/// reports ready.
pub fn is_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.pod_ip.as_deref().map_or(true, str::is_empty) {
        return false;
    }
    match status.container_statuses.as_deref() {
        None | Some([]) => false,
        Some(statuses) => statuses.iter().all(|s| s.ready),
    }
}

/// True when the pod is ready, carries labels, and every selector pair is
/// present with an equal value.
pub fn matches(selector: &BTreeMap<String, String>, pod: &Pod) -> bool {
    let Some(labels) = pod.metadata.labels.as_ref() else {
        return false;
    };
    if !is_ready(pod) {
        return false;
    }
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
