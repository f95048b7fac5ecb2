//! Replicated Data Entities
//!
//! Defines the units of replication exchanged between nodes. Payload contents
//! are opaque to the protocol; only the registered data storage and processor
//! for a resource type ever interpret them.

use serde::{Deserialize, Serialize};

/// Identifies one unit of replicated data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistroKey {
    /// Opaque resource identifier (e.g. a service name)
    pub resource_key: String,
    /// Resource category, used to resolve the registered components
    pub resource_type: String,
    /// Peer the key is addressed to, when it denotes a specific copy
    pub target_server: Option<String>,
}

impl DistroKey {
    /// Create a key without a target peer
    pub fn new(resource_key: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_key: resource_key.into(),
            resource_type: resource_type.into(),
            target_server: None,
        }
    }

    /// Create a key addressed to a specific peer's copy
    pub fn with_target(
        resource_key: impl Into<String>,
        resource_type: impl Into<String>,
        target_server: impl Into<String>,
    ) -> Self {
        Self {
            resource_key: resource_key.into(),
            resource_type: resource_type.into(),
            target_server: Some(target_server.into()),
        }
    }

    /// The same key with the target peer stripped (local addressing)
    pub fn without_target(&self) -> Self {
        Self {
            resource_key: self.resource_key.clone(),
            resource_type: self.resource_type.clone(),
            target_server: None,
        }
    }
}

impl std::fmt::Display for DistroKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target_server {
            Some(target) => write!(f, "{}/{}@{}", self.resource_type, self.resource_key, target),
            None => write!(f, "{}/{}", self.resource_type, self.resource_key),
        }
    }
}

/// Operation carried by a [`DistroData`] payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataOperation {
    /// New data
    Add,
    /// Changed data
    Change,
    /// Data removal
    Delete,
    /// Anti-entropy digest exchange
    Verify,
    /// Full state transfer
    Snapshot,
}

impl DataOperation {
    /// Whether this operation removes data on the receiving side
    pub fn is_removal(&self) -> bool {
        matches!(self, DataOperation::Delete)
    }
}

impl std::fmt::Display for DataOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataOperation::Add => write!(f, "ADD"),
            DataOperation::Change => write!(f, "CHANGE"),
            DataOperation::Delete => write!(f, "DELETE"),
            DataOperation::Verify => write!(f, "VERIFY"),
            DataOperation::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

/// A payload unit exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroData {
    /// Key the payload belongs to
    pub distro_key: DistroKey,
    /// Operation to apply on the receiving side
    pub operation: DataOperation,
    /// Serialized opaque payload
    pub content: Vec<u8>,
}

impl DistroData {
    /// Create a new payload unit
    pub fn new(distro_key: DistroKey, operation: DataOperation, content: Vec<u8>) -> Self {
        Self {
            distro_key,
            operation,
            content,
        }
    }

    /// Create a removal payload (no content)
    pub fn removal(distro_key: DistroKey) -> Self {
        Self {
            distro_key,
            operation: DataOperation::Delete,
            content: Vec::new(),
        }
    }

    /// Resource type of the carried key
    pub fn resource_type(&self) -> &str {
        &self.distro_key.resource_type
    }
}

/// One entry of an anti-entropy digest: a key plus the checksum of its
/// local payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    /// Resource key the checksum belongs to
    pub resource_key: String,
    /// CRC32 of the locally stored payload
    pub checksum: u32,
}

impl DigestEntry {
    /// Compute a digest entry from a key and its stored payload
    pub fn of(resource_key: impl Into<String>, content: &[u8]) -> Self {
        Self {
            resource_key: resource_key.into(),
            checksum: crc32fast::hash(content),
        }
    }
}
