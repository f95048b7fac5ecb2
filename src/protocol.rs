//! Distro Protocol
//!
//! Top-level orchestration of the replication engine: local mutations enter
//! through [`DistroProtocol::sync`], remote traffic enters through the
//! `on_*` entry points, and `start` spawns the background machinery (delay
//! dispatch, verify timer, startup load). There is no leader anywhere; every
//! node pushes its own changes and repairs gaps via verify.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::cluster::ClusterView;
use crate::component::ComponentHolder;
use crate::config::DistroConfig;
use crate::entity::{DataOperation, DistroData, DistroKey};
use crate::error::{Error, Result};
use crate::load::LoadTask;
use crate::partition;
use crate::record::DistroRecords;
use crate::sync::{DistroDelayTask, DistroFailedTaskHandler, SyncDelayProcessor};
use crate::task::{DelayTaskEngine, ExecuteTaskEngine};
use crate::verify::VerifyTimer;
use crate::wire;

/// Leaderless replication protocol instance, one per process
pub struct DistroProtocol {
    config: DistroConfig,
    holder: Arc<ComponentHolder>,
    cluster: Arc<dyn ClusterView>,
    records: Arc<DistroRecords>,
    delay_engine: Arc<DelayTaskEngine<DistroDelayTask>>,
    execute_engine: Arc<ExecuteTaskEngine>,
    load_task: Arc<LoadTask>,
    verify_timer: Arc<VerifyTimer>,
    shutdown: watch::Sender<bool>,
    /// Sources whose verify digest is still being applied
    verify_in_flight: Mutex<HashSet<String>>,
}

impl DistroProtocol {
    /// Create a protocol instance. Must be called from within a tokio
    /// runtime: the execute workers are spawned here, and failing to obtain
    /// them is fatal to the whole replication machinery.
    pub fn new(
        config: DistroConfig,
        holder: Arc<ComponentHolder>,
        cluster: Arc<dyn ClusterView>,
    ) -> Self {
        let records = Arc::new(DistroRecords::new());
        let execute_engine = Arc::new(ExecuteTaskEngine::new(config.effective_workers()));
        let delay_engine = Arc::new(DelayTaskEngine::new(config.dispatch_interval()));
        let load_task = Arc::new(LoadTask::new(
            Arc::clone(&holder),
            Arc::clone(&cluster),
            config.load_retry_delay(),
        ));
        let verify_timer = Arc::new(VerifyTimer::new(
            Arc::clone(&holder),
            Arc::clone(&cluster),
            Arc::clone(&records),
            config.verify_interval(),
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            holder,
            cluster,
            records,
            delay_engine,
            execute_engine,
            load_task,
            verify_timer,
            shutdown,
            verify_in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire the default sync pipeline and spawn the background loops.
    ///
    /// The empty-prefix registrations act as defaults: a caller can still
    /// bind a more specific processor or retry policy per resource type and
    /// the longest-prefix lookup will prefer it.
    pub async fn start(&self) {
        self.delay_engine
            .register_processor(
                "",
                Arc::new(SyncDelayProcessor::new(
                    Arc::clone(&self.holder),
                    Arc::clone(&self.cluster),
                    Arc::clone(&self.records),
                    Arc::clone(&self.execute_engine),
                )),
            )
            .await;
        self.holder
            .register_failed_task_handler(
                "",
                Arc::new(DistroFailedTaskHandler::new(
                    &self.delay_engine,
                    Arc::clone(&self.cluster),
                    self.config.sync_retry_delay(),
                )),
            )
            .await;

        tokio::spawn(Arc::clone(&self.delay_engine).run(self.shutdown.subscribe()));
        tokio::spawn(Arc::clone(&self.verify_timer).run(self.shutdown.subscribe()));
        tokio::spawn(Arc::clone(&self.load_task).run(self.shutdown.subscribe()));
        self.watch_membership();
        info!("distro protocol started on {}", self.cluster.local_member());
    }

    /// Abandon queued pushes addressed to members that left the cluster
    fn watch_membership(&self) {
        let delay_engine = Arc::clone(&self.delay_engine);
        let cluster = Arc::clone(&self.cluster);
        let mut epoch = cluster.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = epoch.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let live: HashSet<String> =
                            cluster.live_members().await.into_iter().collect();
                        let dropped = delay_engine
                            .prune_pending(|key| match &key.target_server {
                                Some(target) => live.contains(target),
                                None => true,
                            })
                            .await;
                        if dropped > 0 {
                            debug!("abandoned {} queued pushes to departed members", dropped);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Stop all background loops
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Replicate a local mutation to every other live member after the
    /// configured sync delay
    pub async fn sync(&self, key: DistroKey, operation: DataOperation) {
        self.sync_with_delay(key, operation, self.config.sync_delay())
            .await;
    }

    /// Replicate a local mutation with an explicit coalescing delay
    pub async fn sync_with_delay(&self, key: DistroKey, operation: DataOperation, delay: Duration) {
        let peers = self.cluster.live_peers().await;
        if peers.is_empty() {
            debug!("no live peers, {} not replicated", key);
            return;
        }
        for peer in peers {
            let targeted = DistroKey::with_target(
                key.resource_key.clone(),
                key.resource_type.clone(),
                peer,
            );
            self.delay_engine
                .add_task(targeted, DistroDelayTask::new(operation, delay))
                .await;
        }
    }

    /// Apply a payload received from a peer.
    ///
    /// Returns `Ok(false)` when the payload was dropped (unknown resource
    /// type, busy verify source, or a processor that declined it).
    pub async fn on_receive(&self, data: DistroData, source: &str) -> Result<bool> {
        match data.operation {
            DataOperation::Verify => self.on_receive_verify(data, source).await,
            DataOperation::Snapshot => {
                let resource_type = data.resource_type().to_string();
                match self.holder.find_data_processor(&resource_type).await {
                    Some(processor) => processor.process_snapshot(data).await,
                    None => {
                        warn!("no processor for snapshot of type {}, dropping", resource_type);
                        Ok(false)
                    }
                }
            }
            _ => {
                let resource_type = data.resource_type().to_string();
                match self.holder.find_data_processor(&resource_type).await {
                    Some(processor) => processor.process_data(data).await,
                    None => {
                        // Usually a peer running a module this node has off.
                        warn!("no processor for type {}, dropping {}", resource_type, data.distro_key);
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Compare a remote digest against local state and pull what is missing
    /// or stale. Local-only keys are left alone: deletes propagate through
    /// sync, never through verify.
    async fn on_receive_verify(&self, data: DistroData, source: &str) -> Result<bool> {
        {
            let mut in_flight = self.verify_in_flight.lock().await;
            if !in_flight.insert(source.to_string()) {
                warn!("verify from {} already in progress, dropping digest", source);
                return Ok(false);
            }
        }
        let outcome = self.apply_verify(data, source).await;
        self.verify_in_flight.lock().await.remove(source);
        outcome
    }

    async fn apply_verify(&self, data: DistroData, source: &str) -> Result<bool> {
        let resource_type = data.resource_type().to_string();
        let record = self.records.record(&resource_type);

        let Some(storage) = self.holder.find_data_storage(&resource_type).await else {
            warn!("no storage for verify of type {}, dropping", resource_type);
            return Ok(false);
        };
        let digest = match wire::decode_digest(&data.content) {
            Ok(digest) => digest,
            Err(e) => {
                warn!("undecodable verify digest from {}: {}", source, e);
                record.verify_fail();
                return Ok(false);
            }
        };

        let mut stale = Vec::new();
        for entry in digest {
            let key = DistroKey::new(entry.resource_key.clone(), resource_type.clone());
            let fresh = match storage.get_data(&key).await? {
                Some(local) => crc32fast::hash(&local.content) == entry.checksum,
                None => false,
            };
            if !fresh {
                stale.push(key);
            }
        }
        if stale.is_empty() {
            return Ok(true);
        }
        debug!("verify from {}: pulling {} stale keys of {}", source, stale.len(), resource_type);

        let transport = self.holder.transport_agent(&resource_type).await?;
        let fetched = match transport.get_datum(&stale, source).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("repair fetch from {} failed: {}", source, e);
                record.verify_fail();
                return Ok(false);
            }
        };

        let Some(processor) = self.holder.find_data_processor(&resource_type).await else {
            warn!("no processor for verify repair of type {}", resource_type);
            return Ok(false);
        };
        for data in fetched {
            let key = data.distro_key.clone();
            match processor.process_data(data).await {
                Ok(true) => {}
                Ok(false) => warn!("repair of {} declined, next verify cycle retries", key),
                // Dropped here; the next verify cycle pulls it again.
                Err(e) => warn!("repair of {} failed: {}", key, e),
            }
        }
        Ok(true)
    }

    /// Serve one local payload to a querying peer
    pub async fn on_query(&self, key: &DistroKey) -> Result<DistroData> {
        let storage = self.holder.data_storage(&key.resource_type).await?;
        storage
            .get_data(key)
            .await?
            .ok_or_else(|| Error::DataNotFound(key.to_string()))
    }

    /// Serve a batch of local payloads, skipping keys this node lacks
    pub async fn on_query_batch(&self, keys: &[DistroKey]) -> Result<Vec<DistroData>> {
        let mut found = Vec::new();
        for key in keys {
            let storage = self.holder.data_storage(&key.resource_type).await?;
            if let Some(data) = storage.get_data(key).await? {
                found.push(data);
            }
        }
        Ok(found)
    }

    /// Serve the full local snapshot of one resource type
    pub async fn on_snapshot(&self, resource_type: &str) -> Result<DistroData> {
        let storage = self.holder.data_storage(resource_type).await?;
        storage.get_snapshot().await
    }

    /// Member responsible for `key` under the current live member list
    pub async fn responsible_member(&self, key: &DistroKey) -> Result<String> {
        let members = self.cluster.live_members().await;
        partition::responsible_member(&key.resource_key, &members).map(str::to_string)
    }

    /// Whether this node owns `key`. Embedders use this to route writes to
    /// the owning node; replication itself pushes to every live member.
    pub async fn is_responsible(&self, key: &DistroKey) -> Result<bool> {
        Ok(self.responsible_member(key).await? == self.cluster.local_member())
    }

    /// Run one verify round immediately, outside the timer cadence
    pub async fn verify_round(&self) {
        self.verify_timer.run_round().await;
    }

    /// Whether this node has caught up with the cluster.
    ///
    /// With `data_warmup` off the node reports initialized immediately and
    /// serves in a degraded state while the load task still retries.
    pub async fn is_initialized(&self) -> bool {
        !self.config.data_warmup || self.load_task.is_all_loaded().await
    }

    /// Replication counters, for dashboards
    pub fn records(&self) -> Arc<DistroRecords> {
        Arc::clone(&self.records)
    }

    /// The cluster view this protocol replicates over
    pub fn cluster(&self) -> Arc<dyn ClusterView> {
        Arc::clone(&self.cluster)
    }
}

impl Drop for DistroProtocol {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use crate::cluster::ClusterMembership;
    use crate::component::{DataProcessor, DataStorage, TransportAgent};
    use crate::config::ClusterConfig;

    /// Shared service table backing one node's storage and processor
    #[derive(Default)]
    struct ServiceTable {
        entries: StdMutex<HashMap<String, Vec<u8>>>,
    }

    impl ServiceTable {
        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
            keys.sort();
            keys
        }

        fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.entries.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl DataStorage for ServiceTable {
        async fn get_data(&self, key: &DistroKey) -> Result<Option<DistroData>> {
            Ok(self.get(&key.resource_key).map(|content| {
                DistroData::new(key.without_target(), DataOperation::Change, content)
            }))
        }

        async fn get_datum(&self, keys: &[DistroKey]) -> Result<Vec<DistroData>> {
            let mut found = Vec::new();
            for key in keys {
                if let Some(data) = self.get_data(key).await? {
                    found.push(data);
                }
            }
            Ok(found)
        }

        async fn put(&self, key: DistroKey, data: DistroData) -> Result<()> {
            self.entries.lock().unwrap().insert(key.resource_key, data.content);
            Ok(())
        }

        async fn get_snapshot(&self) -> Result<DistroData> {
            let entries = self.entries.lock().unwrap().clone();
            Ok(DistroData::new(
                DistroKey::new("", "svc"),
                DataOperation::Snapshot,
                bincode::serialize(&entries)?,
            ))
        }
    }

    struct ServiceProcessor {
        table: Arc<ServiceTable>,
    }

    #[async_trait]
    impl DataProcessor for ServiceProcessor {
        fn process_type(&self) -> &str {
            "svc"
        }

        async fn process_data(&self, data: DistroData) -> Result<bool> {
            let mut entries = self.table.entries.lock().unwrap();
            if data.operation.is_removal() {
                entries.remove(&data.distro_key.resource_key);
            } else {
                entries.insert(data.distro_key.resource_key.clone(), data.content);
            }
            Ok(true)
        }

        async fn process_snapshot(&self, data: DistroData) -> Result<bool> {
            let loaded: HashMap<String, Vec<u8>> = bincode::deserialize(&data.content)?;
            self.table.entries.lock().unwrap().extend(loaded);
            Ok(true)
        }

        async fn keys_to_verify(&self) -> Vec<DistroKey> {
            self.table
                .keys()
                .into_iter()
                .map(|key| DistroKey::new(key, "svc"))
                .collect()
        }
    }

    /// In-process "network" routing transport calls to peer protocols
    #[derive(Default)]
    struct LoopbackNet {
        nodes: StdMutex<HashMap<String, Arc<DistroProtocol>>>,
    }

    impl LoopbackNet {
        fn join(&self, id: &str, node: Arc<DistroProtocol>) {
            self.nodes.lock().unwrap().insert(id.to_string(), node);
        }

        fn node(&self, id: &str) -> Result<Arc<DistroProtocol>> {
            self.nodes
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Error::Transport {
                    target: id.to_string(),
                    reason: "unreachable".to_string(),
                })
        }
    }

    struct LoopbackTransport {
        source: String,
        net: Arc<LoopbackNet>,
    }

    #[async_trait]
    impl TransportAgent for LoopbackTransport {
        async fn sync_data(&self, data: &DistroData, target: &str) -> Result<bool> {
            self.net.node(target)?.on_receive(data.clone(), &self.source).await
        }

        async fn get_data(&self, key: &DistroKey, target: &str) -> Result<DistroData> {
            self.net.node(target)?.on_query(key).await
        }

        async fn get_datum(&self, keys: &[DistroKey], target: &str) -> Result<Vec<DistroData>> {
            self.net.node(target)?.on_query_batch(keys).await
        }

        async fn get_snapshot(&self, resource_type: &str, target: &str) -> Result<DistroData> {
            self.net.node(target)?.on_snapshot(resource_type).await
        }
    }

    struct Node {
        protocol: Arc<DistroProtocol>,
        table: Arc<ServiceTable>,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// JSON payload of a registered service instance
    fn instance(ip: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "ip": ip, "port": 8080 })).unwrap()
    }

    fn fast_config() -> DistroConfig {
        DistroConfig::from_toml_str(
            r#"
            sync_delay_ms = 1
            sync_retry_delay_ms = 10
            verify_interval_ms = 50
            load_retry_delay_ms = 10
            dispatch_interval_ms = 5
            execute_workers = 2
            "#,
        )
        .unwrap()
    }

    async fn make_node(id: &str, all: &[&str], net: &Arc<LoopbackNet>) -> Node {
        init_tracing();
        let cluster = Arc::new(ClusterMembership::new(
            id.to_string(),
            format!("localhost:{id}"),
            &ClusterConfig::default(),
        ));
        for member in all {
            if member != &id {
                cluster
                    .add_member(member.to_string(), format!("localhost:{member}"))
                    .await;
            }
        }

        let holder = Arc::new(ComponentHolder::new());
        let table = Arc::new(ServiceTable::default());
        holder.register_data_storage("svc", table.clone()).await;
        holder
            .register_transport_agent(
                "svc",
                Arc::new(LoopbackTransport {
                    source: id.to_string(),
                    net: Arc::clone(net),
                }),
            )
            .await;
        holder
            .register_data_processor(Arc::new(ServiceProcessor {
                table: table.clone(),
            }))
            .await;

        let protocol = Arc::new(DistroProtocol::new(fast_config(), holder, cluster));
        net.join(id, Arc::clone(&protocol));
        Node { protocol, table }
    }

    async fn put_local(node: &Node, key: &str, content: &[u8]) {
        let distro_key = DistroKey::new(key, "svc");
        node.table
            .put(
                distro_key.clone(),
                DistroData::new(distro_key, DataOperation::Add, content.to_vec()),
            )
            .await
            .unwrap();
    }

    async fn wait_until<F>(condition: F)
    where
        F: Fn() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("cluster did not converge in time");
    }

    #[tokio::test]
    async fn test_local_change_is_pushed_to_every_peer() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2", "node-3"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2", "node-3"], &net).await;
        let c = make_node("node-3", &["node-1", "node-2", "node-3"], &net).await;
        a.protocol.start().await;

        put_local(&a, "order-service", &instance("10.0.0.1")).await;
        a.protocol
            .sync(DistroKey::new("order-service", "svc"), DataOperation::Add)
            .await;

        let record = a.protocol.records().record("svc");
        let watched = Arc::clone(&record);
        wait_until(move || watched.successful_sync_count() >= 2).await;

        assert_eq!(b.table.get("order-service").unwrap(), instance("10.0.0.1"));
        assert_eq!(c.table.get("order-service").unwrap(), instance("10.0.0.1"));
        assert_eq!(record.successful_sync_count(), 2);
        assert_eq!(record.failed_sync_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_propagates() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;
        a.protocol.start().await;

        put_local(&a, "order-service", b"x").await;
        put_local(&b, "order-service", b"x").await;

        a.table.entries.lock().unwrap().remove("order-service");
        a.protocol
            .sync(DistroKey::new("order-service", "svc"), DataOperation::Delete)
            .await;

        let tb = Arc::clone(&b.table);
        wait_until(move || tb.get("order-service").is_none()).await;
    }

    #[tokio::test]
    async fn test_verify_repairs_missing_key() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        put_local(&a, "order-service", &instance("10.0.0.1")).await;
        assert!(b.table.get("order-service").is_none());

        // One digest round from A makes B pull the missing payload.
        a.protocol.verify_round().await;

        assert_eq!(b.table.get("order-service").unwrap(), instance("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_verify_never_deletes_local_only_keys() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        put_local(&a, "order-service", b"a").await;
        put_local(&b, "cart-service", b"b").await;

        a.protocol.verify_round().await;

        // B pulled A's key but kept its own.
        assert!(b.table.get("order-service").is_some());
        assert!(b.table.get("cart-service").is_some());
    }

    #[tokio::test]
    async fn test_divergent_peers_converge_after_verify_rounds() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        put_local(&a, "order-service", b"a1").await;
        put_local(&a, "user-service", b"a2").await;
        put_local(&b, "cart-service", b"b1").await;

        // No further mutations: digest rounds alone must converge both sides.
        for _ in 0..2 {
            a.protocol.verify_round().await;
            b.protocol.verify_round().await;
        }

        assert_eq!(a.table.keys(), b.table.keys());
        for key in a.table.keys() {
            assert_eq!(a.table.get(&key), b.table.get(&key));
        }
    }

    #[tokio::test]
    async fn test_reapplying_data_is_idempotent() {
        let net = Arc::new(LoopbackNet::default());
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        let data = DistroData::new(
            DistroKey::new("order-service", "svc"),
            DataOperation::Add,
            instance("10.0.0.1"),
        );
        assert!(b.protocol.on_receive(data.clone(), "node-1").await.unwrap());
        let after_first = b.table.keys();
        assert!(b.protocol.on_receive(data, "node-1").await.unwrap());

        assert_eq!(b.table.keys(), after_first);
        assert_eq!(b.table.get("order-service").unwrap(), instance("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_unknown_resource_type_is_dropped() {
        let net = Arc::new(LoopbackNet::default());
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        let data = DistroData::new(
            DistroKey::new("rule-1", "acl"),
            DataOperation::Add,
            b"deny".to_vec(),
        );
        let applied = b.protocol.on_receive(data, "node-1").await.unwrap();
        assert!(!applied);
        assert!(b.table.keys().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_bootstrap_marks_node_initialized() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1", "node-2"], &net).await;
        let b = make_node("node-2", &["node-1", "node-2"], &net).await;

        put_local(&a, "order-service", b"a1").await;
        put_local(&a, "user-service", b"a2").await;

        assert!(!b.protocol.is_initialized().await);
        b.protocol.start().await;

        let proto = Arc::clone(&b.protocol);
        tokio::time::timeout(Duration::from_secs(3), async move {
            while !proto.is_initialized().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("load task should complete");

        assert_eq!(b.table.keys(), vec!["order-service", "user-service"]);
    }

    #[tokio::test]
    async fn test_every_node_agrees_on_the_responsible_member() {
        let net = Arc::new(LoopbackNet::default());
        let ids = ["node-1", "node-2", "node-3"];
        let mut nodes = Vec::new();
        for id in ids {
            nodes.push(make_node(id, &ids, &net).await);
        }

        let key = DistroKey::new("order-service", "svc");
        let owner = nodes[0].protocol.responsible_member(&key).await.unwrap();
        for node in &nodes {
            assert_eq!(node.protocol.responsible_member(&key).await.unwrap(), owner);
        }

        let mut owners = 0;
        for node in &nodes {
            if node.protocol.is_responsible(&key).await.unwrap() {
                owners += 1;
            }
        }
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn test_missing_query_reports_not_found() {
        let net = Arc::new(LoopbackNet::default());
        let a = make_node("node-1", &["node-1"], &net).await;

        let err = a
            .protocol
            .on_query(&DistroKey::new("ghost-service", "svc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DataNotFound(_)));
    }
}
