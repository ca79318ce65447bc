//! Durable-state collaborator: leases and checkpoints
//!
//! Tracks, per (consumer group, stream, shard), which worker owns the shard
//! and how far delivery has progressed, so a restarted adapter resumes from
//! its last known position.
//!
//! # Architecture
//!
//! ```text
//! engine ──> shard worker A ──> checkpoint(g/orders/shard-0000, seq=42)
//!        └─> shard worker B ──> checkpoint(g/orders/shard-0001, seq=38)
//! ```
//!
//! Checkpoints only move forward: a late write with an older sequence never
//! overwrites a newer one. Acquiring an existing lease bumps its epoch, so
//! writes from a previous owner are fenced out.

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Identity of one shard lease
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    /// Consumer group sharing the lease table
    pub group: String,
    /// Stream the shard belongs to
    pub stream: String,
    /// Shard identifier
    pub shard: String,
}

impl LeaseKey {
    /// Build a key for one (group, stream, shard) triple
    pub fn new(
        group: impl Into<String>,
        stream: impl Into<String>,
        shard: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
            shard: shard.into(),
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.stream, self.shard)
    }
}

/// State of one shard lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Current owner, `None` after release
    pub owner: Option<String>,
    /// Incremented on every acquisition; fences stale owners
    pub epoch: u64,
    /// Sequence number of the last delivered record, if any
    pub checkpoint: Option<u64>,
}

/// Storage backend for lease and checkpoint records
///
/// Implementations must be safe for concurrent use: every shard worker
/// checkpoints independently while the engine acquires and releases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take ownership of a lease, creating it if absent
    ///
    /// The previous checkpoint, if any, is preserved so the new owner
    /// resumes where the old one stopped.
    async fn acquire(&self, key: &LeaseKey, owner: &str) -> Result<Lease>;

    /// Give up a lease; no-op if `owner` does not hold it
    ///
    /// The checkpoint survives release.
    async fn release(&self, key: &LeaseKey, owner: &str) -> Result<()>;

    /// Record delivery progress for a lease
    ///
    /// Ignored if `owner` no longer holds the lease, or if `sequence` is
    /// not beyond the stored checkpoint (monotonic guarantee).
    async fn checkpoint(&self, key: &LeaseKey, owner: &str, sequence: u64) -> Result<()>;

    /// Read the current state of a lease
    async fn get(&self, key: &LeaseKey) -> Result<Option<Lease>>;
}

/// In-memory lease store for testing and single-node deployments
#[derive(Default)]
pub struct MemoryLeaseStore {
    leases: RwLock<HashMap<LeaseKey, Lease>>,
}

impl MemoryLeaseStore {
    /// Create a new empty lease store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn acquire(&self, key: &LeaseKey, owner: &str) -> Result<Lease> {
        let mut leases = self.leases.write();
        let lease = leases.entry(key.clone()).or_insert(Lease {
            owner: None,
            epoch: 0,
            checkpoint: None,
        });

        lease.owner = Some(owner.to_string());
        lease.epoch += 1;
        Ok(lease.clone())
    }

    async fn release(&self, key: &LeaseKey, owner: &str) -> Result<()> {
        let mut leases = self.leases.write();
        if let Some(lease) = leases.get_mut(key) {
            if lease.owner.as_deref() == Some(owner) {
                lease.owner = None;
            }
        }
        Ok(())
    }

    async fn checkpoint(&self, key: &LeaseKey, owner: &str, sequence: u64) -> Result<()> {
        let mut leases = self.leases.write();
        let lease = leases
            .get_mut(key)
            .ok_or_else(|| AdapterError::Lease(format!("unknown lease '{key}'")))?;

        // A stale owner's write must not land after a takeover
        if lease.owner.as_deref() != Some(owner) {
            return Ok(());
        }

        // Only move forward (monotonic guarantee)
        let should_update = lease
            .checkpoint
            .map(|current| sequence > current)
            .unwrap_or(true);
        if should_update {
            lease.checkpoint = Some(sequence);
        }
        Ok(())
    }

    async fn get(&self, key: &LeaseKey) -> Result<Option<Lease>> {
        Ok(self.leases.read().get(key).cloned())
    }
}
