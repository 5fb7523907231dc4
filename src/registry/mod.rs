//! Registry access subsystem.
//!
//! # Data Flow
//! ```text
//! Streaming transport (cluster API, via kube):
//!     ClusterClient.pods() / config_maps() / secrets() → Api<K>
//!         → watcher → list, then watch from the listed version
//!
//! Long-poll transport (key store, via reqwest):
//!     StoreClient.resync()          → ResyncListing { leaves, index }
//!     StoreClient.wait_next(index)  → PollEvent { key, value, modified_index }
//! ```
//!
//! # Design Decisions
//! - Absent objects surface as `NotFound`, distinct from every other failure
//! - Cluster objects use the upstream API types end to end
//! - Neither client retries; supervision lives in `resilience`

pub mod cluster;
pub mod error;
pub mod store;
pub mod types;

pub use cluster::ClusterClient;
pub use error::{RegistryError, RegistryResult};
pub use store::StoreClient;
pub use types::{ConfigMap, Pod, PollAction, PollEvent, ResyncListing, Secret};
