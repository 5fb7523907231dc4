//! Restart-on-failure supervision for long-running tasks.
//!
//! The supervised task body stays retry-free. This wrapper owns the policy:
//! when the task returns (cleanly or with an error) it is restarted after a
//! backoff delay, until shutdown.

use std::fmt::Display;
use std::future::Future;

use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;

/// Run `task` forever, restarting it with backoff whenever it returns.
///
/// A run that lasted at least `policy.max` counts as healthy and resets the
/// backoff sequence.
pub async fn supervise<F, Fut, E>(
    name: &str,
    policy: BackoffPolicy,
    mut shutdown: broadcast::Receiver<()>,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut backoff = policy.start();

    loop {
        let started = Instant::now();
        let result = tokio::select! {
            result = task() => result,
            _ = shutdown.recv() => {
                tracing::info!(task = name, "Supervised task stopping on shutdown");
                return;
            }
        };

        if started.elapsed() >= policy.max {
            backoff.reset();
        }

        match result {
            Ok(()) => tracing::info!(task = name, "Supervised task ended, restarting"),
            Err(e) => tracing::warn!(task = name, error = %e, "Supervised task failed, restarting"),
        }
        metrics::record_restart(name);

        let delay = backoff.next_delay();
        tracing::debug!(task = name, delay_ms = delay.as_millis() as u64, attempt = backoff.attempt(), "Backing off");

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.recv() => {
                tracing::info!(task = name, "Supervised task stopping on shutdown");
                return;
            }
        }
    }
}
