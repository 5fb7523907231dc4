//! Wire types for registry objects and key-store responses.
//!
//! Cluster objects are the upstream API types. Only the key store's own
//! envelope (listings, waits, errors) is modelled here.

use serde::Deserialize;

pub use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};

/// Action reported by the long-poll store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    Set,
    Delete,
}

impl PollAction {
    pub fn from_action(action: &str) -> Self {
        match action {
            "delete" | "expire" | "compareAndDelete" => PollAction::Delete,
            _ => PollAction::Set,
        }
    }
}

/// A single change returned by a long-poll wait.
#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent {
    pub action: PollAction,
    pub key: String,
    pub value: Option<String>,
    pub modified_index: u64,
    /// Current store index as reported by the server alongside the event.
    pub server_index: Option<u64>,
}

/// Result of a recursive read of the whole registry prefix.
#[derive(Debug, Clone, Default)]
pub struct ResyncListing {
    /// Leaf `(key, value)` pairs in key order.
    pub leaves: Vec<(String, String)>,
    /// Store index the listing is consistent with.
    pub index: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StoreResponse {
    pub action: String,
    pub node: StoreNode,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StoreNode {
    pub key: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub dir: bool,

    #[serde(default)]
    pub nodes: Vec<StoreNode>,

    #[serde(rename = "modifiedIndex", default)]
    pub modified_index: u64,
}

impl StoreNode {
    /// Collect every non-directory node beneath (and including) this one.
    pub fn collect_leaves(self, out: &mut Vec<(String, String)>, max_index: &mut u64) {
        *max_index = (*max_index).max(self.modified_index);
        if self.dir {
            for child in self.nodes {
                child.collect_leaves(out, max_index);
            }
        } else if let Some(value) = self.value {
            out.push((self.key, value));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StoreErrorBody {
    #[serde(rename = "errorCode")]
    pub error_code: u32,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub cause: Option<String>,

    #[serde(default)]
    pub index: u64,
}
