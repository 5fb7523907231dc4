//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Streaming transport:
//!     each watch driver → supervisor.rs (restart with backoff on stream end/failure)
//!
//! Long-poll transport:
//!     resync failure   → backoff.rs (1s, 2s, 4s … capped at 32s, forever)
//!     each poll result → staleness.rs (has history rotated past our marker?)
//!                          → StaleState → abandon incremental updates, full resync
//! ```
//!
//! # Design Decisions
//! - Drivers never retry; supervision is a policy object around them
//! - Backoff resets only after proven progress
//! - Staleness is not fatal; it is one more reason to resync

pub mod backoff;
pub mod staleness;
pub mod supervisor;

pub use backoff::{Backoff, BackoffPolicy};
pub use staleness::{GenerationTracker, StaleState};
pub use supervisor::supervise;
