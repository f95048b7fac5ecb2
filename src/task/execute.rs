//! Execute Worker Pool
//!
//! Fixed set of workers, each owning the partition of keys that hash onto
//! it. A worker drains its queue strictly FIFO, which gives the engine its
//! two guarantees: at most one task for a key is ever running, and tasks for
//! a key run in submission order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::entity::DistroKey;

/// A unit of work owned by the pool once dispatched
#[async_trait]
pub trait ExecuteTask: Send + 'static {
    /// Run the task to completion; errors are logged by the worker
    async fn run(self: Box<Self>) -> crate::error::Result<()>;
}

/// Hash-partitioned worker pool
pub struct ExecuteTaskEngine {
    workers: Vec<mpsc::UnboundedSender<Box<dyn ExecuteTask>>>,
}

impl ExecuteTaskEngine {
    /// Spawn `worker_count` workers (minimum one). Must be called from
    /// within a tokio runtime.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(worker_loop(index, rx));
            workers.push(tx);
        }
        debug!("execute engine started with {} workers", worker_count);
        Self { workers }
    }

    /// Number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a task onto the worker owning `key`
    pub fn dispatch(&self, key: &DistroKey, task: Box<dyn ExecuteTask>) {
        let index = self.worker_index(key);
        if self.workers[index].send(task).is_err() {
            warn!("execute worker {} is gone, task for {} dropped", index, key);
        }
    }

    fn worker_index(&self, key: &DistroKey) -> usize {
        // DefaultHasher::new() is deterministic for the process lifetime,
        // which is all the partition needs.
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.workers.len()
    }
}

async fn worker_loop(index: usize, mut rx: mpsc::UnboundedReceiver<Box<dyn ExecuteTask>>) {
    while let Some(task) = rx.recv().await {
        match std::panic::AssertUnwindSafe(task.run()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("execute worker {}: task failed: {}", index, e);
            }
            Err(_) => {
                error!("execute worker {}: task panicked", index);
            }
        }
    }
    debug!("execute worker {} stopped", index);
}
