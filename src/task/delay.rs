//! Delay Task Engine
//!
//! Single dispatch point for change-notification tasks. Each key is in one
//! of three states: no task, one pending task, or one processing task with
//! at most one queued successor. Concurrent submissions for the same key
//! merge instead of queueing duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, warn};

use super::DelayTask;
use crate::entity::DistroKey;

/// Handles tasks dispatched by the engine, registered per resource-type prefix
#[async_trait]
pub trait DelayTaskProcessor<T: DelayTask>: Send + Sync {
    /// Process one task; `false` asks the engine to requeue it
    async fn process(&self, key: &DistroKey, task: T) -> bool;
}

enum Slot<T> {
    Pending(T),
    Processing { next: Option<T> },
}

/// Coalescing task engine with a periodic dispatch scan
pub struct DelayTaskEngine<T: DelayTask> {
    slots: Mutex<HashMap<DistroKey, Slot<T>>>,
    processors: RwLock<HashMap<String, Arc<dyn DelayTaskProcessor<T>>>>,
    dispatch_interval: Duration,
}

impl<T: DelayTask> DelayTaskEngine<T> {
    /// Create an engine scanning at the given interval
    pub fn new(dispatch_interval: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            processors: RwLock::new(HashMap::new()),
            dispatch_interval,
        }
    }

    /// Register the processor for a resource-type prefix
    pub async fn register_processor(
        &self,
        resource_type: impl Into<String>,
        processor: Arc<dyn DelayTaskProcessor<T>>,
    ) {
        self.processors
            .write()
            .await
            .insert(resource_type.into(), processor);
    }

    /// Submit a task for a key, merging with whatever is already there.
    ///
    /// The whole check-and-insert/check-and-merge runs under one lock, so
    /// concurrent producers for the same key can never race a duplicate in.
    pub async fn add_task(&self, key: DistroKey, task: T) {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&key) {
            None => {
                slots.insert(key, Slot::Pending(task));
            }
            Some(Slot::Pending(existing)) => {
                existing.merge(task);
            }
            Some(Slot::Processing { next }) => match next {
                Some(queued) => queued.merge(task),
                None => *next = Some(task),
            },
        }
    }

    /// Drop pending tasks whose key no longer satisfies `keep`.
    ///
    /// Tasks already processing finish normally; only queued work is
    /// abandoned. Returns how many keys were dropped.
    pub async fn prune_pending<F>(&self, keep: F) -> usize
    where
        F: Fn(&DistroKey) -> bool,
    {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|key, slot| !matches!(slot, Slot::Pending(_)) || keep(key));
        before - slots.len()
    }

    /// Number of keys with a pending (not yet dispatched) task
    pub async fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    /// Run the dispatch loop until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.dispatch_interval);
        debug!("delay task dispatcher started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_due().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("delay task dispatcher stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One dispatch pass: move every due pending task to processing and run
    /// its processor. Public so tests and embedders can drive the engine
    /// without the background loop.
    pub async fn process_due(&self) {
        let due = self.take_due().await;
        for (key, task) in due {
            let processor = self.find_processor(&key.resource_type).await;
            match processor {
                Some(processor) => {
                    let ok = processor.process(&key, task.clone()).await;
                    self.complete(key, task, ok).await;
                }
                None => {
                    // A node without this module enabled; drop, not fatal.
                    warn!("no delay task processor for type {}, dropping task", key.resource_type);
                    self.complete_dropped(key).await;
                }
            }
        }
    }

    async fn take_due(&self) -> Vec<(DistroKey, T)> {
        let mut slots = self.slots.lock().await;
        let mut due = Vec::new();
        for (key, slot) in slots.iter_mut() {
            if let Slot::Pending(task) = slot {
                if task.should_process() {
                    due.push((key.clone(), task.clone()));
                    *slot = Slot::Processing { next: None };
                }
            }
        }
        due
    }

    async fn find_processor(&self, resource_type: &str) -> Option<Arc<dyn DelayTaskProcessor<T>>> {
        let processors = self.processors.read().await;
        processors
            .iter()
            .filter(|(prefix, _)| resource_type.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, processor)| Arc::clone(processor))
    }

    /// Finish processing a key. On success the queued successor (if any)
    /// becomes pending; on failure the retained task is requeued, absorbing
    /// any successor that arrived meanwhile.
    async fn complete(&self, key: DistroKey, retained: T, ok: bool) {
        let mut slots = self.slots.lock().await;
        let next = match slots.remove(&key) {
            Some(Slot::Processing { next }) => next,
            other => {
                warn!("delay task for {} completed in unexpected state", key);
                if let Some(slot) = other {
                    slots.insert(key, slot);
                }
                return;
            }
        };

        let follow_up = if ok {
            next
        } else {
            let mut requeued = retained;
            if let Some(newer) = next {
                requeued.merge(newer);
            }
            Some(requeued)
        };

        if let Some(task) = follow_up {
            slots.insert(key, Slot::Pending(task));
        }
    }

    async fn complete_dropped(&self, key: DistroKey) {
        let mut slots = self.slots.lock().await;
        if let Some(Slot::Processing { next: Some(task) }) = slots.remove(&key) {
            slots.insert(key, Slot::Pending(task));
        }
    }
}
