//! Long-poll update driver.
//!
//! One sequential task: full resync, then alternate between rendering the
//! current snapshot and a single blocking `wait_next`. Any failure of the
//! update step, including falling behind the server's history, abandons the
//! incremental position and starts over from a fresh resync.

use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::observability::metrics;
use crate::registry::{PollAction, PollEvent, RegistryError, ResyncListing, StoreClient};
use crate::render::RenderPipeline;
use crate::resilience::{Backoff, BackoffPolicy, GenerationTracker, StaleState};
use crate::snapshot::SnapshotStore;
use crate::watch::event::{apply, decode_poll, ObjectNames};

/// Why an incremental run stopped.
#[derive(Debug)]
enum FollowEnd {
    Stale(StaleState),
    Failed(RegistryError),
    Shutdown,
}

/// Drives the long-poll transport end to end.
pub struct UpdateDriver {
    client: StoreClient,
    names: ObjectNames,
    pipeline: RenderPipeline,
    policy: BackoffPolicy,
    history_window: u64,
}

impl UpdateDriver {
    pub fn new(
        client: StoreClient,
        names: ObjectNames,
        pipeline: RenderPipeline,
        policy: BackoffPolicy,
        history_window: u64,
    ) -> Self {
        Self {
            client,
            names,
            pipeline,
            policy,
            history_window,
        }
    }

    /// Read the whole registry prefix into a fresh store.
    ///
    /// The store and tracker live for one resync cycle only.
    pub async fn resync(&self) -> Result<(SnapshotStore, GenerationTracker), RegistryError> {
        let listing = self.client.resync().await?;
        let store = store_from_listing(&listing, &self.names);
        tracing::info!(
            index = listing.index,
            keys = listing.leaves.len(),
            pods = store.pod_count(),
            "Resync complete"
        );
        Ok((store, GenerationTracker::new(listing.index, self.history_window)))
    }

    /// One resync and one render, then return.
    pub async fn run_once(&mut self) -> Result<(), RegistryError> {
        let (store, _) = self.resync().await?;
        metrics::record_resync(true);
        self.pipeline.render(&store.read_snapshot()).await;
        Ok(())
    }

    /// Resync and follow updates forever, until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = self.policy.start();

        loop {
            let resynced = tokio::select! {
                result = self.resync() => result,
                _ = shutdown.recv() => return,
            };
            let (store, mut tracker) = match resynced {
                Ok(state) => {
                    metrics::record_resync(true);
                    backoff.reset();
                    state
                }
                Err(e) => {
                    metrics::record_resync(false);
                    tracing::warn!(error = %e, "Resync failed");
                    if !pause(&mut backoff, &mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            match self.follow(&store, &mut tracker, &mut shutdown).await {
                FollowEnd::Shutdown => return,
                FollowEnd::Stale(stale) => {
                    tracing::warn!(marker = stale.marker, earliest = stale.earliest, "Fell behind, resyncing");
                }
                FollowEnd::Failed(e) => {
                    tracing::warn!(error = %e, applied = tracker.applied(), "Update step failed");
                    if !pause(&mut backoff, &mut shutdown).await {
                        return;
                    }
                }
            }
        }
    }

    async fn follow(
        &mut self,
        store: &SnapshotStore,
        tracker: &mut GenerationTracker,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> FollowEnd {
        loop {
            if store.notifier().take() {
                self.pipeline.render(&store.read_snapshot()).await;
            }

            let waited = tokio::select! {
                result = self.client.wait_next(tracker.next_wait_index()) => result,
                _ = shutdown.recv() => return FollowEnd::Shutdown,
            };
            let event = match waited {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(RegistryError::IndexCleared { earliest, .. }) => {
                    return FollowEnd::Stale(StaleState {
                        marker: tracker.applied(),
                        earliest,
                    });
                }
                Err(e) => return FollowEnd::Failed(e),
            };

            if let Err(stale) = check_position(tracker, &event) {
                return FollowEnd::Stale(stale);
            }
            if !tracker.advance(event.modified_index) {
                tracing::debug!(key = %event.key, index = event.modified_index, "Ignoring already applied change");
                continue;
            }
            apply_poll_event(store, &event, &self.names);
        }
    }
}

/// Wait out the next backoff delay. Returns false on shutdown.
async fn pause(backoff: &mut Backoff, shutdown: &mut broadcast::Receiver<()>) -> bool {
    let delay = backoff.next_delay();
    tracing::info!(delay_secs = delay.as_secs_f64(), attempt = backoff.attempt(), "Retrying after backoff");
    tokio::select! {
        _ = sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

/// Stale if the server's history no longer reaches back to our next index.
fn check_position(tracker: &GenerationTracker, event: &PollEvent) -> Result<(), StaleState> {
    match event.server_index {
        Some(current) => tracker.ensure_current_within_window(current),
        None => Ok(()),
    }
}

/// Build a fresh store from a resync listing. Undecodable leaves are skipped.
pub fn store_from_listing(listing: &ResyncListing, names: &ObjectNames) -> SnapshotStore {
    let store = SnapshotStore::new();
    for (key, value) in &listing.leaves {
        let event = PollEvent {
            action: PollAction::Set,
            key: key.clone(),
            value: Some(value.clone()),
            modified_index: listing.index,
            server_index: Some(listing.index),
        };
        apply_poll_event(&store, &event, names);
    }
    store
}

fn apply_poll_event(store: &SnapshotStore, event: &PollEvent, names: &ObjectNames) {
    let decoded = match decode_poll(event, names) {
        Ok(decoded) => decoded,
        Err(e) => {
            metrics::record_decode_error("poll");
            tracing::warn!(key = %event.key, error = %e, "Skipping undecodable change");
            return;
        }
    };

    let kind = decoded.kind();
    match apply(store, decoded) {
        Ok(changed) => {
            metrics::record_event_applied(kind);
            tracing::debug!(key = %event.key, kind, changed, "Applied change");
        }
        Err(e) => {
            metrics::record_decode_error("poll");
            tracing::warn!(key = %event.key, kind, error = %e, "Rejected change");
        }
    }
}
