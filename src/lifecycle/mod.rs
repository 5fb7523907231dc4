//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → registry client + RenderPipeline → transport tasks
//!
//! Change signalling (notifier.rs):
//!     SnapshotStore mutation → signal() → render loop wait_and_clear()
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → drivers, supervisor and render loop return
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then client and pipeline, then tasks
//! - Every long-running task selects on the shutdown broadcast

pub mod notifier;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use notifier::ChangeNotifier;
pub use shutdown::Shutdown;
