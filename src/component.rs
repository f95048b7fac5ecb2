//! Component Registry
//!
//! Binds a resource-type prefix to the pluggable pieces the protocol drives:
//! a local data storage adapter, a transport agent, a failed-task handler and
//! a data processor. Registration happens once at startup; lookups run on
//! every dispatch, so the maps are read-mostly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entity::{DataOperation, DistroData, DistroKey};
use crate::error::{Error, Result};

/// Local snapshot/get/put adapter for one category of replicated data.
///
/// The protocol never interprets payload contents; it only moves them.
#[async_trait]
pub trait DataStorage: Send + Sync {
    /// Fetch the local payload for a key, if present
    async fn get_data(&self, key: &DistroKey) -> Result<Option<DistroData>>;

    /// Fetch the local payloads for a batch of keys, skipping absent ones
    async fn get_datum(&self, keys: &[DistroKey]) -> Result<Vec<DistroData>>;

    /// Store a payload locally
    async fn put(&self, key: DistroKey, data: DistroData) -> Result<()>;

    /// Full local state as one snapshot payload
    async fn get_snapshot(&self) -> Result<DistroData>;
}

impl std::fmt::Debug for dyn DataStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn DataStorage").finish_non_exhaustive()
    }
}

/// Network seam: pushes payloads to a named peer and fetches data back.
///
/// The engine treats every call as potentially blocking on the wire; all
/// failures surface as retryable [`Error`] values.
#[async_trait]
pub trait TransportAgent: Send + Sync {
    /// Push a payload to a peer; `Ok(false)` means the peer rejected it
    async fn sync_data(&self, data: &DistroData, target: &str) -> Result<bool>;

    /// Fetch a single payload from a peer
    async fn get_data(&self, key: &DistroKey, target: &str) -> Result<DistroData>;

    /// Fetch a batch of payloads from a peer
    async fn get_datum(&self, keys: &[DistroKey], target: &str) -> Result<Vec<DistroData>>;

    /// Fetch a peer's full snapshot for one resource type
    async fn get_snapshot(&self, resource_type: &str, target: &str) -> Result<DistroData>;
}

/// Applies received remote data to local state
#[async_trait]
pub trait DataProcessor: Send + Sync {
    /// Resource-type prefix this processor handles
    fn process_type(&self) -> &str;

    /// Apply one remote payload; must be idempotent, redelivery happens
    async fn process_data(&self, data: DistroData) -> Result<bool>;

    /// Apply a full snapshot payload
    async fn process_snapshot(&self, data: DistroData) -> Result<bool>;

    /// Keys whose local copies should be advertised in verify digests
    async fn keys_to_verify(&self) -> Vec<DistroKey>;
}

/// Decides what happens after a push to a peer fails
#[async_trait]
pub trait FailedTaskHandler: Send + Sync {
    /// Schedule (or decline) another attempt for a failed push
    async fn retry(&self, key: DistroKey, operation: DataOperation, reason: &Error);
}

/// Registry binding resource-type prefixes to their components.
///
/// `find_*` lookups match the longest registered prefix of the requested
/// type, so `"svc"` serves `"svc/instances"` unless a more specific binding
/// exists. An unmatched type yields `None`; callers log and drop, since it
/// generally means a peer runs with a module this node does not have.
#[derive(Default)]
pub struct ComponentHolder {
    storages: RwLock<HashMap<String, Arc<dyn DataStorage>>>,
    transports: RwLock<HashMap<String, Arc<dyn TransportAgent>>>,
    failed_handlers: RwLock<HashMap<String, Arc<dyn FailedTaskHandler>>>,
    processors: RwLock<HashMap<String, Arc<dyn DataProcessor>>>,
}

fn find_by_prefix<T: ?Sized>(
    map: &HashMap<String, Arc<T>>,
    resource_type: &str,
) -> Option<Arc<T>> {
    map.iter()
        .filter(|(prefix, _)| resource_type.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, component)| Arc::clone(component))
}

impl ComponentHolder {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the storage for a resource-type prefix
    pub async fn register_data_storage(&self, resource_type: impl Into<String>, storage: Arc<dyn DataStorage>) {
        self.storages.write().await.insert(resource_type.into(), storage);
    }

    /// Register (or overwrite) the transport for a resource-type prefix
    pub async fn register_transport_agent(&self, resource_type: impl Into<String>, agent: Arc<dyn TransportAgent>) {
        self.transports.write().await.insert(resource_type.into(), agent);
    }

    /// Register (or overwrite) the failed-task handler for a resource-type prefix
    pub async fn register_failed_task_handler(
        &self,
        resource_type: impl Into<String>,
        handler: Arc<dyn FailedTaskHandler>,
    ) {
        self.failed_handlers.write().await.insert(resource_type.into(), handler);
    }

    /// Register (or overwrite) a processor under its own `process_type`
    pub async fn register_data_processor(&self, processor: Arc<dyn DataProcessor>) {
        self.processors
            .write()
            .await
            .insert(processor.process_type().to_string(), processor);
    }

    /// Find the storage for a resource type
    pub async fn find_data_storage(&self, resource_type: &str) -> Option<Arc<dyn DataStorage>> {
        find_by_prefix(&*self.storages.read().await, resource_type)
    }

    /// Find the transport agent for a resource type
    pub async fn find_transport_agent(&self, resource_type: &str) -> Option<Arc<dyn TransportAgent>> {
        find_by_prefix(&*self.transports.read().await, resource_type)
    }

    /// Find the failed-task handler for a resource type
    pub async fn find_failed_task_handler(&self, resource_type: &str) -> Option<Arc<dyn FailedTaskHandler>> {
        find_by_prefix(&*self.failed_handlers.read().await, resource_type)
    }

    /// Find the processor for a resource type
    pub async fn find_data_processor(&self, resource_type: &str) -> Option<Arc<dyn DataProcessor>> {
        find_by_prefix(&*self.processors.read().await, resource_type)
    }

    /// All resource-type prefixes with a registered storage
    pub async fn storage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.storages.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    /// Storage lookup that treats a missing binding as a fatal wiring error
    pub async fn data_storage(&self, resource_type: &str) -> Result<Arc<dyn DataStorage>> {
        self.find_data_storage(resource_type)
            .await
            .ok_or_else(|| Error::ComponentNotFound {
                component: "data storage",
                resource_type: resource_type.to_string(),
            })
    }

    /// Transport lookup that treats a missing binding as a fatal wiring error
    pub async fn transport_agent(&self, resource_type: &str) -> Result<Arc<dyn TransportAgent>> {
        self.find_transport_agent(resource_type)
            .await
            .ok_or_else(|| Error::ComponentNotFound {
                component: "transport agent",
                resource_type: resource_type.to_string(),
            })
    }
}
