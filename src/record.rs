//! Replication Telemetry
//!
//! Per-resource-type counters for sync and verify outcomes. Counters are
//! monotonically increasing and live for the process lifetime; they are the
//! only externally observable surface of the protocol besides convergence
//! itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Counters for one resource type
#[derive(Debug, Default)]
pub struct DistroRecord {
    total_sync: AtomicU64,
    successful_sync: AtomicU64,
    failed_sync: AtomicU64,
    failed_verify: AtomicU64,
}

impl DistroRecord {
    /// Record a successful push attempt
    pub fn sync_success(&self) {
        self.total_sync.fetch_add(1, Ordering::Relaxed);
        self.successful_sync.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed push attempt
    pub fn sync_fail(&self) {
        self.total_sync.fetch_add(1, Ordering::Relaxed);
        self.failed_sync.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed verify exchange
    pub fn verify_fail(&self) {
        self.failed_verify.fetch_add(1, Ordering::Relaxed);
    }

    /// Total push attempts
    pub fn total_sync_count(&self) -> u64 {
        self.total_sync.load(Ordering::Relaxed)
    }

    /// Successful push attempts
    pub fn successful_sync_count(&self) -> u64 {
        self.successful_sync.load(Ordering::Relaxed)
    }

    /// Failed push attempts
    pub fn failed_sync_count(&self) -> u64 {
        self.failed_sync.load(Ordering::Relaxed)
    }

    /// Failed verify exchanges
    pub fn failed_verify_count(&self) -> u64 {
        self.failed_verify.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot for dashboards
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            total_sync: self.total_sync_count(),
            successful_sync: self.successful_sync_count(),
            failed_sync: self.failed_sync_count(),
            failed_verify: self.failed_verify_count(),
        }
    }
}

/// Serializable snapshot of a [`DistroRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordSnapshot {
    pub total_sync: u64,
    pub successful_sync: u64,
    pub failed_sync: u64,
    pub failed_verify: u64,
}

/// Registry of counters, keyed by resource type.
///
/// Records are created lazily on first use and never removed.
#[derive(Debug, Default)]
pub struct DistroRecords {
    records: RwLock<HashMap<String, Arc<DistroRecord>>>,
}

impl DistroRecords {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the record for a resource type
    pub fn record(&self, resource_type: &str) -> Arc<DistroRecord> {
        if let Some(record) = self.records.read().unwrap().get(resource_type) {
            return Arc::clone(record);
        }
        let mut records = self.records.write().unwrap();
        Arc::clone(
            records
                .entry(resource_type.to_string())
                .or_insert_with(|| Arc::new(DistroRecord::default())),
        )
    }

    /// Snapshot every known record, keyed by resource type
    pub fn snapshot_all(&self) -> HashMap<String, RecordSnapshot> {
        self.records
            .read()
            .unwrap()
            .iter()
            .map(|(resource_type, record)| (resource_type.clone(), record.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_monotonic() {
        let record = DistroRecord::default();
        record.sync_success();
        record.sync_fail();
        record.sync_success();
        record.verify_fail();

        assert_eq!(record.total_sync_count(), 3);
        assert_eq!(record.successful_sync_count(), 2);
        assert_eq!(record.failed_sync_count(), 1);
        assert_eq!(record.failed_verify_count(), 1);
    }

    #[test]
    fn test_registry_is_lazy_and_shared() {
        let records = DistroRecords::new();
        records.record("svc").sync_success();
        records.record("svc").sync_success();
        records.record("cfg").verify_fail();

        assert_eq!(records.record("svc").total_sync_count(), 2);
        assert_eq!(records.record("cfg").failed_verify_count(), 1);

        let all = records.snapshot_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["svc"].successful_sync, 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let records = Arc::new(DistroRecords::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let records = Arc::clone(&records);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    records.record("svc").sync_success();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(records.record("svc").total_sync_count(), 8000);
    }
}
