//! Load Task
//!
//! One-shot bulk snapshot transfer executed at node startup: for every
//! registered resource type, fetch a full snapshot from some live peer and
//! apply it before the node advertises itself as caught up. Peers are tried
//! in canonical order; if every peer fails the whole task retries after a
//! delay instead of leaving the node permanently un-synced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::cluster::ClusterView;
use crate::component::ComponentHolder;

/// Startup snapshot loader
pub struct LoadTask {
    holder: Arc<ComponentHolder>,
    cluster: Arc<dyn ClusterView>,
    load_retry_delay: Duration,
    load_completed: RwLock<HashMap<String, bool>>,
}

impl LoadTask {
    /// Create a load task over the shared engine state
    pub fn new(
        holder: Arc<ComponentHolder>,
        cluster: Arc<dyn ClusterView>,
        load_retry_delay: Duration,
    ) -> Self {
        Self {
            holder,
            cluster,
            load_retry_delay,
            load_completed: RwLock::new(HashMap::new()),
        }
    }

    /// Whether a specific resource type has been bootstrapped
    pub async fn is_loaded(&self, resource_type: &str) -> bool {
        self.load_completed
            .read()
            .await
            .get(resource_type)
            .copied()
            .unwrap_or(false)
    }

    /// Whether every registered resource type has been bootstrapped
    pub async fn is_all_loaded(&self) -> bool {
        let types = self.holder.storage_types().await;
        let completed = self.load_completed.read().await;
        types
            .iter()
            .all(|resource_type| completed.get(resource_type).copied().unwrap_or(false))
    }

    /// Run load attempts until everything is bootstrapped or `shutdown`
    /// flips. The node may serve in a degraded state while this retries.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if self.load_once().await {
                info!("snapshot load complete for all resource types");
                return;
            }
            warn!(
                "snapshot load incomplete, retrying in {:?}",
                self.load_retry_delay
            );
            tokio::select! {
                _ = tokio::time::sleep(self.load_retry_delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// One load pass over every still-unloaded resource type.
    ///
    /// Returns true when every registered type is bootstrapped.
    pub async fn load_once(&self) -> bool {
        let peers = self.cluster.live_peers().await;
        for resource_type in self.holder.storage_types().await {
            if self.is_loaded(&resource_type).await {
                continue;
            }
            if peers.is_empty() {
                // First node of a fresh cluster: nothing to pull.
                debug!("no live peers, {} starts from local state", resource_type);
                self.mark_loaded(&resource_type).await;
                continue;
            }
            if self.load_type(&resource_type, &peers).await {
                self.mark_loaded(&resource_type).await;
            }
        }
        self.is_all_loaded().await
    }

    async fn mark_loaded(&self, resource_type: &str) {
        self.load_completed
            .write()
            .await
            .insert(resource_type.to_string(), true);
    }

    /// Try each candidate peer in order until one snapshot applies
    async fn load_type(&self, resource_type: &str, peers: &[String]) -> bool {
        let Some(processor) = self.holder.find_data_processor(resource_type).await else {
            warn!("no data processor for {}, cannot bootstrap", resource_type);
            return false;
        };
        let Some(transport) = self.holder.find_transport_agent(resource_type).await else {
            warn!("no transport agent for {}, cannot bootstrap", resource_type);
            return false;
        };

        for peer in peers {
            let snapshot = match transport.get_snapshot(resource_type, peer).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("snapshot fetch for {} from {} failed: {}", resource_type, peer, e);
                    continue;
                }
            };
            match processor.process_snapshot(snapshot).await {
                Ok(true) => {
                    info!("bootstrapped {} from {}", resource_type, peer);
                    return true;
                }
                Ok(false) => {
                    warn!("snapshot of {} from {} was not applied", resource_type, peer);
                }
                Err(e) => {
                    warn!("applying snapshot of {} from {} failed: {}", resource_type, peer, e);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    use crate::cluster::ClusterMembership;
    use crate::component::{DataProcessor, DataStorage, TransportAgent};
    use crate::config::ClusterConfig;
    use crate::entity::{DataOperation, DistroData, DistroKey};
    use crate::error::Error;

    #[derive(Default)]
    struct MemStorage {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl DataStorage for MemStorage {
        async fn get_data(&self, key: &DistroKey) -> crate::error::Result<Option<DistroData>> {
            Ok(self.entries.lock().await.get(&key.resource_key).map(|content| {
                DistroData::new(key.clone(), DataOperation::Change, content.clone())
            }))
        }

        async fn get_datum(&self, _keys: &[DistroKey]) -> crate::error::Result<Vec<DistroData>> {
            Ok(Vec::new())
        }

        async fn put(&self, key: DistroKey, data: DistroData) -> crate::error::Result<()> {
            self.entries.lock().await.insert(key.resource_key, data.content);
            Ok(())
        }

        async fn get_snapshot(&self) -> crate::error::Result<DistroData> {
            let entries = self.entries.lock().await;
            Ok(DistroData::new(
                DistroKey::new("", "svc"),
                DataOperation::Snapshot,
                bincode::serialize(&*entries)?,
            ))
        }
    }

    struct SnapshotProcessor {
        storage: Arc<MemStorage>,
    }

    #[async_trait]
    impl DataProcessor for SnapshotProcessor {
        fn process_type(&self) -> &str {
            "svc"
        }

        async fn process_data(&self, data: DistroData) -> crate::error::Result<bool> {
            self.storage.put(data.distro_key.clone(), data).await?;
            Ok(true)
        }

        async fn process_snapshot(&self, data: DistroData) -> crate::error::Result<bool> {
            let entries: HashMap<String, Vec<u8>> = bincode::deserialize(&data.content)?;
            for (resource_key, content) in entries {
                let key = DistroKey::new(resource_key, "svc");
                self.storage
                    .put(key.clone(), DistroData::new(key, DataOperation::Add, content))
                    .await?;
            }
            Ok(true)
        }

        async fn keys_to_verify(&self) -> Vec<DistroKey> {
            Vec::new()
        }
    }

    /// Peers before `healthy_from` (by index in the peer list) fail
    struct FlakySnapshotTransport {
        snapshot: DistroData,
        healthy_peer: String,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TransportAgent for FlakySnapshotTransport {
        async fn sync_data(&self, _data: &DistroData, _target: &str) -> crate::error::Result<bool> {
            Ok(true)
        }

        async fn get_data(&self, key: &DistroKey, target: &str) -> crate::error::Result<DistroData> {
            Err(Error::Transport {
                target: target.to_string(),
                reason: format!("no data for {key}"),
            })
        }

        async fn get_datum(
            &self,
            _keys: &[DistroKey],
            _target: &str,
        ) -> crate::error::Result<Vec<DistroData>> {
            Ok(Vec::new())
        }

        async fn get_snapshot(
            &self,
            _resource_type: &str,
            target: &str,
        ) -> crate::error::Result<DistroData> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if target == self.healthy_peer {
                Ok(self.snapshot.clone())
            } else {
                Err(Error::Transport {
                    target: target.to_string(),
                    reason: "unreachable".to_string(),
                })
            }
        }
    }

    async fn snapshot_of(pairs: &[(&str, &[u8])]) -> DistroData {
        let remote = MemStorage::default();
        for (key, content) in pairs {
            let key = DistroKey::new(*key, "svc");
            remote
                .put(key.clone(), DistroData::new(key, DataOperation::Add, content.to_vec()))
                .await
                .unwrap();
        }
        remote.get_snapshot().await.unwrap()
    }

    async fn build(healthy_peer: &str) -> (Arc<LoadTask>, Arc<MemStorage>, Arc<FlakySnapshotTransport>) {
        let cluster = Arc::new(ClusterMembership::new(
            "node-1".to_string(),
            "localhost:7401".to_string(),
            &ClusterConfig::default(),
        ));
        cluster.add_member("node-2".to_string(), "localhost:7402".to_string()).await;
        cluster.add_member("node-3".to_string(), "localhost:7403".to_string()).await;

        let holder = Arc::new(ComponentHolder::new());
        let storage = Arc::new(MemStorage::default());
        let transport = Arc::new(FlakySnapshotTransport {
            snapshot: snapshot_of(&[("order-service", b"{\"ip\":\"10.0.0.1\"}")]).await,
            healthy_peer: healthy_peer.to_string(),
            attempts: AtomicUsize::new(0),
        });

        holder.register_data_storage("svc", storage.clone()).await;
        holder.register_transport_agent("svc", transport.clone()).await;
        holder
            .register_data_processor(Arc::new(SnapshotProcessor {
                storage: storage.clone(),
            }))
            .await;

        let task = Arc::new(LoadTask::new(holder, cluster, Duration::from_millis(10)));
        (task, storage, transport)
    }

    #[tokio::test]
    async fn test_bootstrap_falls_through_to_healthy_peer() {
        // node-2 is down; node-3 serves the snapshot.
        let (task, storage, transport) = build("node-3").await;

        assert!(!task.is_all_loaded().await);
        assert!(task.load_once().await);
        assert!(task.is_loaded("svc").await);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);

        let loaded = storage
            .get_data(&DistroKey::new("order-service", "svc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.content, b"{\"ip\":\"10.0.0.1\"}".to_vec());
    }

    #[tokio::test]
    async fn test_all_peers_failing_leaves_type_unloaded() {
        let (task, _storage, transport) = build("node-9").await;

        assert!(!task.load_once().await);
        assert!(!task.is_loaded("svc").await);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_background_retry_until_loaded() {
        let (task, _storage, transport) = build("node-3").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&task).run(shutdown_rx));
        handle.await.unwrap();
        shutdown_tx.send(true).ok();

        assert!(task.is_all_loaded().await);
        assert!(transport.attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_fresh_cluster_without_peers_is_trivially_loaded() {
        let cluster = Arc::new(ClusterMembership::new(
            "node-1".to_string(),
            "localhost:7401".to_string(),
            &ClusterConfig::default(),
        ));
        let holder = Arc::new(ComponentHolder::new());
        holder
            .register_data_storage("svc", Arc::new(MemStorage::default()))
            .await;

        let task = LoadTask::new(holder, cluster, Duration::from_millis(10));
        assert!(task.load_once().await);
    }
}
