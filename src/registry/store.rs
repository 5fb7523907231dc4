//! HTTP client for the key store behind the registry (long-poll transport).
//!
//! # Responsibilities
//! - Recursive listing of the whole registry prefix
//! - Long-poll waits for the next change at a given index
//! - Map transport and HTTP failures onto [`RegistryError`]
//!
//! No retries happen here. Retry policy belongs to the callers.

use std::time::Duration;

use reqwest::Response;

use crate::config::RegistryConfig;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{PollAction, PollEvent, ResyncListing, StoreErrorBody, StoreResponse};

/// Response header carrying the key store's current index.
const STORE_INDEX_HEADER: &str = "x-etcd-index";

/// Key store error code for a missing key.
const STORE_KEY_NOT_FOUND: u32 = 100;

/// Key store error code for a wait index that has rotated out of history.
const STORE_EVENT_INDEX_CLEARED: u32 = 401;

/// Key-store client used by the long-poll driver.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    store_base: String,
    key_prefix: String,
    request_timeout: Duration,
}

impl StoreClient {
    /// Create a new client from configuration.
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        url::Url::parse(&config.store_url)?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|source| RegistryError::Transport {
                path: config.store_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            store_base: config.store_url.trim_end_matches('/').to_string(),
            key_prefix: config.key_prefix.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn store_url(&self) -> String {
        format!("{}/v2/keys{}", self.store_base, self.key_prefix)
    }

    /// Recursively list every key under the registry prefix.
    pub async fn resync(&self) -> RegistryResult<ResyncListing> {
        let url = self.store_url();
        let response = self
            .http
            .get(&url)
            .query(&[("recursive", "true")])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|source| RegistryError::Transport { path: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(store_error(&url, 0, response).await);
        }

        let header_index = store_index(&response);
        let body = response
            .bytes()
            .await
            .map_err(|source| RegistryError::Transport { path: url.clone(), source })?;
        let parsed: StoreResponse = serde_json::from_slice(&body).map_err(|e| RegistryError::Decode {
            path: url.clone(),
            reason: e.to_string(),
        })?;

        let mut leaves = Vec::new();
        let mut max_index = 0;
        parsed.node.collect_leaves(&mut leaves, &mut max_index);
        leaves.sort();

        Ok(ResyncListing {
            leaves,
            index: header_index.unwrap_or(max_index),
        })
    }

    /// Block until the next change at or after `from_index`.
    ///
    /// Returns `Ok(None)` when the server ends the wait without an event.
    pub async fn wait_next(&self, from_index: u64) -> RegistryResult<Option<PollEvent>> {
        let url = self.store_url();
        let wait_index = from_index.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[("wait", "true"), ("recursive", "true"), ("waitIndex", wait_index.as_str())])
            .send()
            .await
            .map_err(|source| RegistryError::Transport { path: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(store_error(&url, from_index, response).await);
        }

        let server_index = store_index(&response);
        let body = response
            .bytes()
            .await
            .map_err(|source| RegistryError::Transport { path: url.clone(), source })?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let parsed: StoreResponse = serde_json::from_slice(&body).map_err(|e| RegistryError::Decode {
            path: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Some(PollEvent {
            action: PollAction::from_action(&parsed.action),
            key: parsed.node.key,
            value: parsed.node.value,
            modified_index: parsed.node.modified_index,
            server_index,
        }))
    }
}

fn store_index(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(STORE_INDEX_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn store_error(path: &str, requested: u64, response: Response) -> RegistryError {
    let status = response.status().as_u16();
    let body: Option<StoreErrorBody> = match response.bytes().await {
        Ok(bytes) => serde_json::from_slice(&bytes).ok(),
        Err(_) => None,
    };

    match body {
        Some(body) if body.error_code == STORE_KEY_NOT_FOUND => RegistryError::NotFound(path.to_string()),
        Some(body) if body.error_code == STORE_EVENT_INDEX_CLEARED => {
            let earliest = body
                .cause
                .as_deref()
                .and_then(parse_cleared_cause)
                .unwrap_or(body.index);
            tracing::debug!(message = %body.message, earliest, requested, "Wait index rotated out of history");
            RegistryError::IndexCleared { requested, earliest }
        }
        _ if status == 404 => RegistryError::NotFound(path.to_string()),
        _ => RegistryError::Status {
            path: path.to_string(),
            status,
        },
    }
}

/// Extract the earliest retained index from a cause like
/// `"the requested history has been cleared [1008/1]"`.
pub fn parse_cleared_cause(cause: &str) -> Option<u64> {
    let start = cause.rfind('[')?;
    let inner = cause[start + 1..].split(']').next()?;
    inner.split('/').next()?.trim().parse().ok()
}
