//! "Fell behind" detection for the long-poll transport.

use thiserror::Error;

/// The incremental position is no longer covered by the server's history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fell behind: applied index {marker}, earliest retained index {earliest}")]
pub struct StaleState {
    pub marker: u64,
    pub earliest: u64,
}

/// Tracks the last applied registry index for one resync cycle.
#[derive(Debug, Clone)]
pub struct GenerationTracker {
    applied: u64,
    history_window: u64,
}

impl GenerationTracker {
    /// Start tracking from the index a resync listing was consistent with.
    pub fn new(applied: u64, history_window: u64) -> Self {
        Self {
            applied,
            history_window: history_window.max(1),
        }
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Index to pass to the next wait.
    pub fn next_wait_index(&self) -> u64 {
        self.applied.saturating_add(1)
    }

    /// Fail if the server's earliest retained index is past our next wait index.
    pub fn ensure_retained(&self, earliest: u64) -> Result<(), StaleState> {
        if earliest > self.next_wait_index() {
            Err(StaleState {
                marker: self.applied,
                earliest,
            })
        } else {
            Ok(())
        }
    }

    /// Same check, deriving the earliest retained index from the server's
    /// current index and the configured history window.
    pub fn ensure_current_within_window(&self, current: u64) -> Result<(), StaleState> {
        let earliest = current.saturating_sub(self.history_window).saturating_add(1);
        self.ensure_retained(earliest)
    }

    /// Record an applied event. Returns false (and leaves the marker alone) if
    /// the index does not move forward.
    pub fn advance(&mut self, index: u64) -> bool {
        if index <= self.applied {
            return false;
        }
        self.applied = index;
        true
    }
}
