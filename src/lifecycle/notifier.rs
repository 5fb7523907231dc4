//! Single-slot change signal between watchers and the render loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A sticky, coalescing wake-up flag.
///
/// Any number of `signal()` calls before the waiter runs collapse into one
/// wake-up. A signal raised after `wait_and_clear` returns is never lost: it
/// stays set until the next wait consumes it.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    pending: AtomicBool,
    notify: Notify,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark state as changed. Idempotent.
    pub fn signal(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    /// Whether a change is pending.
    pub fn is_set(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume a pending change without blocking.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Block until a change is pending, then clear it.
    pub async fn wait_and_clear(&self) {
        loop {
            let notified = self.notify.notified();
            if self.take() {
                return;
            }
            notified.await;
        }
    }
}
