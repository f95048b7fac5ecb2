//! Sync Protocol
//!
//! Push replication: a coalesced change for a key becomes one execute task
//! per target peer, which reads the local payload and pushes it over the
//! transport. Failures are counted and handed to the type's failed-task
//! handler, which requeues the push unless the target has left the cluster.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::ClusterView;
use crate::component::{ComponentHolder, FailedTaskHandler};
use crate::entity::{DataOperation, DistroData, DistroKey};
use crate::error::Error;
use crate::record::DistroRecords;
use crate::task::{DelayTask, DelayTaskEngine, DelayTaskProcessor, ExecuteTask, ExecuteTaskEngine};

/// Coalescible change notification for one key/target pair
#[derive(Debug, Clone)]
pub struct DistroDelayTask {
    operation: DataOperation,
    task_interval: Duration,
    last_process_time: Instant,
}

impl DistroDelayTask {
    /// Create a task that becomes due after `delay`
    pub fn new(operation: DataOperation, delay: Duration) -> Self {
        Self {
            operation,
            task_interval: delay,
            last_process_time: Instant::now(),
        }
    }

    /// Operation this task will push
    pub fn operation(&self) -> DataOperation {
        self.operation
    }
}

impl DelayTask for DistroDelayTask {
    fn merge(&mut self, newer: Self) {
        // A removal must never be absorbed away: a dropped delete leaves a
        // resurrected entry on the remote side.
        if self.operation.is_removal() || newer.operation.is_removal() {
            self.operation = DataOperation::Delete;
        } else {
            self.operation = newer.operation;
        }
        // Tighter timing wins; the existing schedule is otherwise kept.
        self.task_interval = self.task_interval.min(newer.task_interval);
    }

    fn should_process(&self) -> bool {
        self.last_process_time.elapsed() >= self.task_interval
    }
}

/// Turns due delay tasks into per-target execute tasks
pub struct SyncDelayProcessor {
    holder: Arc<ComponentHolder>,
    cluster: Arc<dyn ClusterView>,
    records: Arc<DistroRecords>,
    execute_engine: Arc<ExecuteTaskEngine>,
}

impl SyncDelayProcessor {
    /// Create a processor wired to the shared engine state
    pub fn new(
        holder: Arc<ComponentHolder>,
        cluster: Arc<dyn ClusterView>,
        records: Arc<DistroRecords>,
        execute_engine: Arc<ExecuteTaskEngine>,
    ) -> Self {
        Self {
            holder,
            cluster,
            records,
            execute_engine,
        }
    }
}

#[async_trait]
impl DelayTaskProcessor<DistroDelayTask> for SyncDelayProcessor {
    async fn process(&self, key: &DistroKey, task: DistroDelayTask) -> bool {
        self.execute_engine.dispatch(
            key,
            Box::new(SyncExecuteTask {
                key: key.clone(),
                operation: task.operation(),
                holder: Arc::clone(&self.holder),
                cluster: Arc::clone(&self.cluster),
                records: Arc::clone(&self.records),
            }),
        );
        true
    }
}

/// One push of one key to one target peer
struct SyncExecuteTask {
    key: DistroKey,
    operation: DataOperation,
    holder: Arc<ComponentHolder>,
    cluster: Arc<dyn ClusterView>,
    records: Arc<DistroRecords>,
}

#[async_trait]
impl ExecuteTask for SyncExecuteTask {
    async fn run(self: Box<Self>) -> crate::error::Result<()> {
        let Some(target) = self.key.target_server.clone() else {
            warn!("sync task for {} has no target, dropping", self.key);
            return Ok(());
        };

        // The peer left the cluster; abandoning is success, not failure.
        if !self.cluster.is_live(&target).await {
            debug!("sync target {} left the cluster, abandoning {}", target, self.key);
            return Ok(());
        }

        let resource_type = self.key.resource_type.clone();
        let data = match self.operation {
            DataOperation::Delete => DistroData::removal(self.key.without_target()),
            _ => {
                let storage = self.holder.data_storage(&resource_type).await?;
                match storage.get_data(&self.key.without_target()).await? {
                    Some(mut data) => {
                        data.operation = self.operation;
                        data
                    }
                    None => {
                        // Deleted locally between coalescing and dispatch.
                        debug!("no local data for {}, nothing to push", self.key);
                        return Ok(());
                    }
                }
            }
        };

        let transport = self.holder.transport_agent(&resource_type).await?;
        let record = self.records.record(&resource_type);
        let failure = match transport.sync_data(&data, &target).await {
            Ok(true) => {
                record.sync_success();
                debug!("synced {} {} to {}", data.operation, self.key, target);
                return Ok(());
            }
            Ok(false) => Error::Transport {
                target: target.clone(),
                reason: "peer rejected sync".to_string(),
            },
            Err(e) => e,
        };

        record.sync_fail();
        match self.holder.find_failed_task_handler(&resource_type).await {
            Some(handler) => {
                handler.retry(self.key.clone(), self.operation, &failure).await;
            }
            None => {
                warn!("sync of {} to {} failed with no retry handler: {}", self.key, target, failure);
            }
        }
        Ok(())
    }
}

/// Default retry policy: requeue the push after a fixed delay, forever,
/// until it succeeds or the target leaves the cluster
pub struct DistroFailedTaskHandler {
    delay_engine: Weak<DelayTaskEngine<DistroDelayTask>>,
    cluster: Arc<dyn ClusterView>,
    retry_delay: Duration,
}

impl DistroFailedTaskHandler {
    /// Create a handler requeueing onto `delay_engine` after `retry_delay`
    pub fn new(
        delay_engine: &Arc<DelayTaskEngine<DistroDelayTask>>,
        cluster: Arc<dyn ClusterView>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            delay_engine: Arc::downgrade(delay_engine),
            cluster,
            retry_delay,
        }
    }
}

#[async_trait]
impl FailedTaskHandler for DistroFailedTaskHandler {
    async fn retry(&self, key: DistroKey, operation: DataOperation, reason: &Error) {
        if let Some(target) = &key.target_server {
            if !self.cluster.is_live(target).await {
                debug!("not retrying {} for departed member {}", key, target);
                return;
            }
        }
        let Some(engine) = self.delay_engine.upgrade() else {
            return;
        };
        debug!("requeueing {} {} after failure: {}", operation, key, reason);
        engine
            .add_task(key, DistroDelayTask::new(operation, self.retry_delay))
            .await;
    }
}
