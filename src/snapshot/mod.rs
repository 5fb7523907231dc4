//! Snapshot subsystem: the in-memory model the proxy configuration is rendered from.
//!
//! # Data Flow
//! ```text
//! watch drivers
//!     → store.rs (upsert/remove pod, set services/certs/keys/template)
//!         → readiness.rs (is the pod ready? does it match each selector?)
//!         → certs.rs (merge cert and key halves by name)
//!     → ChangeNotifier.signal()
//!
//! render loop
//!     → store.read_snapshot() → Snapshot (owned, never torn)
//! ```

pub mod certs;
pub mod readiness;
pub mod store;

pub use certs::{CertificateEntry, CertificatePair, CertificateTable};
pub use readiness::{is_ready, matches};
pub use store::{ServiceDescriptor, ServiceParseError, ServiceView, Snapshot, SnapshotStore};
