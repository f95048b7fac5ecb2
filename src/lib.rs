//! Distro - Leaderless Replication Engine
//!
//! A peer-to-peer replication engine for ephemeral service-registry data.
//! Every node accepts writes for the data it is responsible for, pushes
//! changes asynchronously to its peers, and runs periodic anti-entropy
//! rounds so replicas that missed a push still converge.
//!
//! # Architecture
//!
//! There is no leader. Responsibility for a key is assigned by a
//! deterministic hash over the canonical member list; changed data flows
//! through a coalescing delay engine into a hash-partitioned worker pool
//! that pushes it to every other live member. A periodic verify loop
//! exchanges per-key checksum digests to catch anything the push path
//! missed, and a one-shot load task bootstraps a joining node from a peer
//! snapshot.
//!
//! # Features
//!
//! - Deterministic responsibility partitioning over the member list
//! - Change coalescing with at-most-one-in-flight processing per key
//! - Strict per-key ordering via hash-partitioned FIFO workers
//! - Push replication with pluggable retry policy per resource type
//! - Bounded anti-entropy: digests every round, payloads only on divergence
//! - Snapshot bootstrap for joining nodes
//! - Per-resource-type sync/verify counters for dashboards

pub mod cluster;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod load;
pub mod partition;
pub mod protocol;
pub mod record;
pub mod sync;
pub mod task;
pub mod verify;
pub mod wire;

pub use config::DistroConfig;
pub use error::{Error, Result};
pub use protocol::DistroProtocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cluster::{ClusterMembership, ClusterView};
    pub use crate::component::{
        ComponentHolder, DataProcessor, DataStorage, FailedTaskHandler, TransportAgent,
    };
    pub use crate::config::DistroConfig;
    pub use crate::entity::{DataOperation, DigestEntry, DistroData, DistroKey};
    pub use crate::error::{Error, Result};
    pub use crate::protocol::DistroProtocol;
    pub use crate::record::{DistroRecord, DistroRecords};
}
