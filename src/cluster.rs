//! Cluster Membership Management
//!
//! Tracks the set of alive peer nodes and exposes the canonical ordered view
//! the partitioner and the replication loops consume. The engine only ever
//! talks to the [`ClusterView`] trait; [`ClusterMembership`] is the default
//! heartbeat-driven implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use crate::config::ClusterConfig;

/// Read-side view of the cluster consumed by the replication engine
#[async_trait]
pub trait ClusterView: Send + Sync {
    /// Identifier of the local node
    fn local_member(&self) -> &str;

    /// Alive members in canonical (sorted) order, including the local node
    async fn live_members(&self) -> Vec<String>;

    /// Whether a peer is currently alive
    async fn is_live(&self, member: &str) -> bool;

    /// Receiver that changes value whenever membership changes
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Alive members excluding the local node, in canonical order
    async fn live_peers(&self) -> Vec<String> {
        let local = self.local_member().to_string();
        self.live_members()
            .await
            .into_iter()
            .filter(|member| *member != local)
            .collect()
    }
}

/// Health of a tracked member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Member is alive and heartbeating
    Up,
    /// Member missed recent heartbeats
    Suspect,
    /// Member has been dropped from the live set
    Down,
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Up => write!(f, "UP"),
            MemberStatus::Suspect => write!(f, "SUSPECT"),
            MemberStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// State of a single member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberState {
    /// Unique member identifier
    pub id: String,
    /// Member address (host:port)
    pub address: String,
    /// Current status
    pub status: MemberStatus,
    /// Last heartbeat time (not serialized)
    #[serde(skip)]
    pub last_heartbeat: Option<Instant>,
    /// When the member joined
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl MemberState {
    /// Create a new member state
    pub fn new(id: String, address: String) -> Self {
        Self {
            id,
            address,
            status: MemberStatus::Up,
            last_heartbeat: None,
            joined_at: chrono::Utc::now(),
        }
    }

    /// Check if the member heartbeated within `timeout`
    pub fn is_healthy(&self, timeout: Duration) -> bool {
        match self.last_heartbeat {
            Some(last) => last.elapsed() < timeout,
            None => false,
        }
    }

    /// Update heartbeat time
    pub fn touch(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }
}

/// Heartbeat-driven membership tracker
pub struct ClusterMembership {
    /// This node's ID
    local_id: String,
    /// All known members (including self)
    members: RwLock<HashMap<String, MemberState>>,
    /// Heartbeat timeout before a member turns suspect
    heartbeat_timeout: Duration,
    /// Grace period before a suspect member is dropped
    drop_timeout: Duration,
    /// Membership epoch, bumped on every change
    epoch: watch::Sender<u64>,
}

impl ClusterMembership {
    /// Create a new membership tracker seeded with the local node
    pub fn new(local_id: String, address: String, config: &ClusterConfig) -> Self {
        let mut members = HashMap::new();
        let mut local = MemberState::new(local_id.clone(), address);
        local.touch();
        members.insert(local_id.clone(), local);

        let (epoch, _) = watch::channel(0);
        Self {
            local_id,
            members: RwLock::new(members),
            heartbeat_timeout: Duration::from_millis(config.heartbeat_timeout_ms),
            drop_timeout: Duration::from_millis(config.drop_timeout_ms),
            epoch,
        }
    }

    fn bump_epoch(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Add a peer member; no-op when already known
    pub async fn add_member(&self, id: String, address: String) {
        let mut members = self.members.write().await;
        if !members.contains_key(&id) {
            let mut member = MemberState::new(id.clone(), address);
            member.touch();
            members.insert(id, member);
            drop(members);
            self.bump_epoch();
        }
    }

    /// Remove a member from the view
    pub async fn remove_member(&self, id: &str) -> Option<MemberState> {
        let removed = self.members.write().await.remove(id);
        if removed.is_some() {
            self.bump_epoch();
        }
        removed
    }

    /// Record a heartbeat from a member
    pub async fn record_heartbeat(&self, id: &str) {
        let mut members = self.members.write().await;
        if let Some(member) = members.get_mut(id) {
            member.touch();
            if member.status != MemberStatus::Up {
                member.status = MemberStatus::Up;
                drop(members);
                self.bump_epoch();
            }
        } else {
            tracing::warn!("heartbeat from unknown member {}", id);
        }
    }

    /// Sweep heartbeat deadlines and demote silent members.
    ///
    /// Returns the ids whose status changed in this sweep.
    pub async fn check_timeouts(&self) -> Vec<String> {
        let mut members = self.members.write().await;
        let mut changed = Vec::new();

        for (id, member) in members.iter_mut() {
            if id == &self.local_id {
                continue;
            }
            let Some(last) = member.last_heartbeat else {
                continue;
            };
            let silent_for = last.elapsed();
            match member.status {
                MemberStatus::Up if silent_for >= self.heartbeat_timeout => {
                    member.status = MemberStatus::Suspect;
                    changed.push(id.clone());
                }
                MemberStatus::Suspect if silent_for >= self.drop_timeout => {
                    member.status = MemberStatus::Down;
                    changed.push(id.clone());
                }
                _ => {}
            }
        }

        if !changed.is_empty() {
            drop(members);
            self.bump_epoch();
        }
        changed
    }

    /// Get a member's state
    pub async fn get_member(&self, id: &str) -> Option<MemberState> {
        self.members.read().await.get(id).cloned()
    }

    /// All known members, regardless of status
    pub async fn all_members(&self) -> Vec<MemberState> {
        self.members.read().await.values().cloned().collect()
    }

    /// Number of known members
    pub async fn size(&self) -> usize {
        self.members.read().await.len()
    }
}

#[async_trait]
impl ClusterView for ClusterMembership {
    fn local_member(&self) -> &str {
        &self.local_id
    }

    async fn live_members(&self) -> Vec<String> {
        let members = self.members.read().await;
        let mut live: Vec<String> = members
            .values()
            .filter(|m| m.status == MemberStatus::Up)
            .map(|m| m.id.clone())
            .collect();
        // Sorted so every node indexes the same list identically.
        live.sort();
        live
    }

    async fn is_live(&self, member: &str) -> bool {
        self.members
            .read()
            .await
            .get(member)
            .map(|m| m.status == MemberStatus::Up)
            .unwrap_or(false)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }
}
