//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ResilienceConfig;

/// Calculate exponential backoff delay with jitter.
///
/// Attempt 1 waits `base_ms`, each further attempt doubles, capped at
/// `max_ms`. Up to `jitter_percent` of the delay is added at random.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_percent: u8) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay.saturating_mul(u64::from(jitter_percent)) / 100;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Retry policy shared by the resync loop and the watch supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub jitter_percent: u8,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.initial_backoff_secs),
            max: Duration::from_secs(config.max_backoff_secs),
            jitter_percent: config.jitter_percent,
        }
    }

    /// A fresh backoff sequence.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Stateful position in a backoff sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Delay before the next retry; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        calculate_backoff(
            self.attempt,
            self.policy.initial.as_millis() as u64,
            self.policy.max.as_millis() as u64,
            self.policy.jitter_percent,
        )
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
