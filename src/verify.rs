//! Verify Protocol
//!
//! Anti-entropy: each node periodically pushes a per-key checksum digest for
//! every registered resource type to every other live peer. Receivers pull
//! full payloads only for keys that are missing or stale locally, so steady
//! state traffic stays bounded by digest size. One peer failing must never
//! block verifying against the rest.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::cluster::ClusterView;
use crate::component::ComponentHolder;
use crate::entity::{DataOperation, DigestEntry, DistroData, DistroKey};
use crate::record::DistroRecords;
use crate::wire;

/// Periodic digest pusher
pub struct VerifyTimer {
    holder: Arc<ComponentHolder>,
    cluster: Arc<dyn ClusterView>,
    records: Arc<DistroRecords>,
    verify_interval: Duration,
}

impl VerifyTimer {
    /// Create a timer over the shared engine state
    pub fn new(
        holder: Arc<ComponentHolder>,
        cluster: Arc<dyn ClusterView>,
        records: Arc<DistroRecords>,
        verify_interval: Duration,
    ) -> Self {
        Self {
            holder,
            cluster,
            records,
            verify_interval,
        }
    }

    /// Run verify rounds until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.verify_interval);
        debug!("verify timer started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_round().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("verify timer stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One verify round: push the current digest of every resource type to
    /// every live peer. Public so tests and embedders can drive rounds
    /// directly.
    pub async fn run_round(&self) {
        let peers = self.cluster.live_peers().await;
        if peers.is_empty() {
            return;
        }

        for resource_type in self.holder.storage_types().await {
            let digest = match self.build_digest(&resource_type).await {
                Some(digest) if !digest.is_empty() => digest,
                _ => continue,
            };
            let content = match wire::encode_digest(&digest) {
                Ok(content) => content,
                Err(e) => {
                    warn!("failed to encode verify digest for {}: {}", resource_type, e);
                    self.records.record(&resource_type).verify_fail();
                    continue;
                }
            };

            let Some(transport) = self.holder.find_transport_agent(&resource_type).await else {
                warn!("no transport agent for {}, skipping verify", resource_type);
                continue;
            };

            let record = self.records.record(&resource_type);
            let sends = peers.iter().map(|peer| {
                let data = DistroData::new(
                    DistroKey::with_target("", resource_type.clone(), peer.clone()),
                    DataOperation::Verify,
                    content.clone(),
                );
                let transport = Arc::clone(&transport);
                async move {
                    let outcome = transport.sync_data(&data, peer).await;
                    (peer.clone(), outcome)
                }
            });

            for (peer, outcome) in join_all(sends).await {
                match outcome {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("peer {} rejected verify digest for {}", peer, resource_type);
                        record.verify_fail();
                    }
                    Err(e) => {
                        warn!("verify push to {} failed for {}: {}", peer, resource_type, e);
                        record.verify_fail();
                    }
                }
            }
        }
    }

    /// Per-key checksums of everything the processor wants advertised
    async fn build_digest(&self, resource_type: &str) -> Option<Vec<DigestEntry>> {
        let processor = self.holder.find_data_processor(resource_type).await?;
        let storage = self.holder.find_data_storage(resource_type).await?;

        let keys = processor.keys_to_verify().await;
        if keys.is_empty() {
            return Some(Vec::new());
        }
        match storage.get_datum(&keys).await {
            Ok(datum) => Some(
                datum
                    .iter()
                    .map(|data| DigestEntry::of(data.distro_key.resource_key.clone(), &data.content))
                    .collect(),
            ),
            Err(e) => {
                warn!("failed to read local data for {} digest: {}", resource_type, e);
                self.records.record(resource_type).verify_fail();
                None
            }
        }
    }
}
