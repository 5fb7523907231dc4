//! Watch subsystem: turning registry changes into snapshot mutations.
//!
//! # Data Flow
//! ```text
//! Streaming transport (one task per driver, each supervised):
//!     WatchDriver::pods / config_maps / secret
//!         → kube watcher: listing, then Apply / Delete
//!         → event.rs Watched::relist() / change() → RegistryEvent
//!         → event.rs apply() → SnapshotStore
//!
//! Long-poll transport (one sequential task):
//!     UpdateDriver
//!         → resync() → fresh SnapshotStore + GenerationTracker
//!         → loop { render if changed; wait_next(marker + 1) → staleness check
//!                  → decode_poll() → apply() }
//! ```
//!
//! # Design Decisions
//! - Decoding yields a closed set of events dispatched by one exhaustive match
//! - Drivers never retry; restart and resync policy lives in `resilience`
//! - Every (re)start relists, and the listing replaces that driver's slice
//! - Malformed events are logged and skipped, never partially applied

pub mod driver;
pub mod event;
pub mod poll;

pub use driver::WatchDriver;
pub use event::{apply, decode_poll, DecodeError, ObjectNames, PodChange, RegistryEvent, Watched};
pub use poll::{store_from_listing, UpdateDriver};
