//! Distro Configuration
//!
//! This module provides configuration structures for the distro
//! replication engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main distro configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistroConfig {
    /// Delay before a coalesced change is pushed to peers, in milliseconds
    #[serde(default = "default_sync_delay_ms")]
    pub sync_delay_ms: u64,

    /// Delay before a failed push is attempted again, in milliseconds
    #[serde(default = "default_sync_retry_delay_ms")]
    pub sync_retry_delay_ms: u64,

    /// Interval between anti-entropy digest rounds, in milliseconds
    #[serde(default = "default_verify_interval_ms")]
    pub verify_interval_ms: u64,

    /// Delay between startup snapshot-load attempts, in milliseconds
    #[serde(default = "default_load_retry_delay_ms")]
    pub load_retry_delay_ms: u64,

    /// Interval of the delay-task dispatch scan, in milliseconds
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Number of execute workers (0 = one per CPU core)
    #[serde(default)]
    pub execute_workers: usize,

    /// Report the node uninitialized until the startup load completes
    #[serde(default = "default_data_warmup")]
    pub data_warmup: bool,

    /// Cluster membership configuration
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Cluster membership configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Heartbeat timeout in milliseconds before a peer is considered suspect
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Grace period in milliseconds before a suspect peer is dropped
    #[serde(default = "default_drop_timeout_ms")]
    pub drop_timeout_ms: u64,
}

fn default_sync_delay_ms() -> u64 {
    1000
}

fn default_sync_retry_delay_ms() -> u64 {
    3000
}

fn default_verify_interval_ms() -> u64 {
    5000
}

fn default_load_retry_delay_ms() -> u64 {
    30_000
}

fn default_dispatch_interval_ms() -> u64 {
    100
}

fn default_data_warmup() -> bool {
    true
}

fn default_heartbeat_timeout_ms() -> u64 {
    5000
}

fn default_drop_timeout_ms() -> u64 {
    30_000
}

impl Default for DistroConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            drop_timeout_ms: default_drop_timeout_ms(),
        }
    }
}

impl DistroConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DistroConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_interval_ms == 0 {
            return Err(Error::Config(
                "dispatch_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.verify_interval_ms == 0 {
            return Err(Error::Config(
                "verify_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before a coalesced change is pushed
    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }

    /// Delay before a failed push is retried
    pub fn sync_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync_retry_delay_ms)
    }

    /// Interval between anti-entropy rounds
    pub fn verify_interval(&self) -> Duration {
        Duration::from_millis(self.verify_interval_ms)
    }

    /// Delay between startup load attempts
    pub fn load_retry_delay(&self) -> Duration {
        Duration::from_millis(self.load_retry_delay_ms)
    }

    /// Interval of the delay-task dispatch scan
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// Effective worker count for the execute engine
    pub fn effective_workers(&self) -> usize {
        if self.execute_workers > 0 {
            self.execute_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
