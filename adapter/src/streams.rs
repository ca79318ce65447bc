//! Stream-management collaborator
//!
//! [`StreamService`] is the adapter's view of the streaming backend: stream
//! provisioning and consumer registration on the management side, ranged
//! shard reads on the data side. The engine never talks to a wire client
//! directly; it goes through this trait, which makes the whole pipeline
//! testable against [`MemoryStreamService`].
//!
//! # Architecture
//!
//! ```text
//! producers ──put_record──► stream ──┬── shard-0000 (ordered records)
//!                                    └── shard-0001 (ordered records)
//!                                              ▲
//! engine ──get_records(shard, from)────────────┘
//! ```
//!
//! Sequence numbers are per-shard, monotonic, and start at 1; `from`
//! positions are exclusive ("after sequence N").

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use virta_core::{InitialPosition, Record};

/// A shard within a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    /// Shard identifier, unique within its stream
    pub shard_id: String,
}

/// Description of one stream as reported by the backend
#[derive(Debug, Clone)]
pub struct StreamDescription {
    /// Stream name
    pub name: String,
    /// Backend resource identifier
    pub arn: String,
    /// Shards currently open on the stream
    pub shards: Vec<ShardInfo>,
}

/// A registered stream consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    /// Consumer (group) name
    pub name: String,
    /// Backend resource identifier
    pub arn: String,
}

/// Read position for a shard poll
///
/// Derived from a lease checkpoint when one exists, otherwise from the
/// adapter's [`InitialPosition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// All retained records, oldest first
    Horizon,
    /// Only records published after this read
    Latest,
    /// Records whose arrival timestamp is at or after the instant
    AtTimestamp(DateTime<Utc>),
    /// Records with a sequence number strictly greater than this
    AfterSequence(u64),
}

impl From<InitialPosition> for ReadFrom {
    fn from(position: InitialPosition) -> Self {
        match position {
            InitialPosition::TrimHorizon => Self::Horizon,
            InitialPosition::Latest => Self::Latest,
            InitialPosition::AtTimestamp(t) => Self::AtTimestamp(t),
        }
    }
}

/// Result of one shard poll
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Records in sequence order; may be empty
    pub records: Vec<Record>,
    /// Highest sequence number accounted for by this read
    ///
    /// Polling again with `ReadFrom::AfterSequence(resume_after)` continues
    /// where this batch left off, including for empty reads (a `Latest`
    /// read reports the shard tip here).
    pub resume_after: u64,
}

/// Stream-management collaborator
///
/// `describe_stream` and `list_consumers` are idempotent and safe to
/// retry; `create_stream`, `delete_stream` and `register_consumer` are
/// not - calling them twice is an error, not a no-op.
#[async_trait]
pub trait StreamService: Send + Sync {
    /// Create a stream with the given number of shards
    async fn create_stream(&self, name: &str, shard_count: u32) -> Result<()>;

    /// Delete a stream
    ///
    /// With `enforce_consumer_deletion` unset, a stream that still has
    /// registered consumers is refused.
    async fn delete_stream(&self, name: &str, enforce_consumer_deletion: bool) -> Result<()>;

    /// Describe a stream: resource id plus open shards
    async fn describe_stream(&self, name: &str) -> Result<StreamDescription>;

    /// Enumerate consumers registered on a stream
    async fn list_consumers(&self, stream_arn: &str) -> Result<Vec<ConsumerInfo>>;

    /// Register a named consumer on a stream
    async fn register_consumer(&self, stream_arn: &str, consumer_name: &str)
        -> Result<ConsumerInfo>;

    /// Publish one record; returns the assigned sequence number
    ///
    /// The partition key selects the shard; records sharing a key land on
    /// the same shard and therefore stay ordered relative to each other.
    async fn put_record(&self, stream: &str, partition_key: &str, data: Bytes) -> Result<u64>;

    /// Read up to `limit` records from one shard
    async fn get_records(
        &self,
        stream: &str,
        shard_id: &str,
        from: ReadFrom,
        limit: usize,
    ) -> Result<RecordBatch>;
}

// ============================================================================
// In-memory reference implementation
// ============================================================================

struct StoredRecord {
    sequence: u64,
    partition_key: String,
    arrival_ns: i64,
    data: Bytes,
}

struct ShardState {
    shard_id: String,
    next_sequence: u64,
    records: Vec<StoredRecord>,
}

impl ShardState {
    fn new(index: u32) -> Self {
        Self {
            shard_id: format!("shard-{index:04}"),
            next_sequence: 1,
            records: Vec::new(),
        }
    }

    /// Sequence number of the newest record, 0 for an empty shard
    fn tip(&self) -> u64 {
        self.next_sequence - 1
    }
}

struct StreamState {
    arn: String,
    shards: Vec<ShardState>,
    consumers: Vec<ConsumerInfo>,
}

/// In-memory stream backend for testing and single-node deployments
///
/// Holds streams, shards and registered consumers behind one `RwLock`;
/// producers and shard workers may call into it concurrently.
#[derive(Default)]
pub struct MemoryStreamService {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl MemoryStreamService {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Simple string hash (FNV-1a), used for partition-key placement
    fn hash_key(key: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in key.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

#[async_trait]
impl StreamService for MemoryStreamService {
    async fn create_stream(&self, name: &str, shard_count: u32) -> Result<()> {
        if shard_count == 0 {
            return Err(AdapterError::Stream(format!(
                "stream '{name}' needs at least one shard"
            )));
        }

        let mut streams = self.streams.write();
        if streams.contains_key(name) {
            return Err(AdapterError::Stream(format!(
                "stream '{name}' already exists"
            )));
        }

        streams.insert(
            name.to_string(),
            StreamState {
                arn: format!("arn:virta:stream/{name}"),
                shards: (0..shard_count).map(ShardState::new).collect(),
                consumers: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_stream(&self, name: &str, enforce_consumer_deletion: bool) -> Result<()> {
        let mut streams = self.streams.write();
        let stream = streams
            .get(name)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream '{name}'")))?;

        if !stream.consumers.is_empty() && !enforce_consumer_deletion {
            return Err(AdapterError::Stream(format!(
                "stream '{name}' still has {} registered consumers",
                stream.consumers.len()
            )));
        }

        streams.remove(name);
        Ok(())
    }

    async fn describe_stream(&self, name: &str) -> Result<StreamDescription> {
        let streams = self.streams.read();
        let stream = streams
            .get(name)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream '{name}'")))?;

        Ok(StreamDescription {
            name: name.to_string(),
            arn: stream.arn.clone(),
            shards: stream
                .shards
                .iter()
                .map(|s| ShardInfo {
                    shard_id: s.shard_id.clone(),
                })
                .collect(),
        })
    }

    async fn list_consumers(&self, stream_arn: &str) -> Result<Vec<ConsumerInfo>> {
        let streams = self.streams.read();
        let stream = streams
            .values()
            .find(|s| s.arn == stream_arn)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream arn '{stream_arn}'")))?;

        Ok(stream.consumers.clone())
    }

    async fn register_consumer(
        &self,
        stream_arn: &str,
        consumer_name: &str,
    ) -> Result<ConsumerInfo> {
        let mut streams = self.streams.write();
        let stream = streams
            .values_mut()
            .find(|s| s.arn == stream_arn)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream arn '{stream_arn}'")))?;

        if stream.consumers.iter().any(|c| c.name == consumer_name) {
            return Err(AdapterError::Stream(format!(
                "consumer '{consumer_name}' already registered on '{stream_arn}'"
            )));
        }

        let consumer = ConsumerInfo {
            name: consumer_name.to_string(),
            arn: format!("{stream_arn}/consumer/{consumer_name}"),
        };
        stream.consumers.push(consumer.clone());
        Ok(consumer)
    }

    async fn put_record(&self, stream: &str, partition_key: &str, data: Bytes) -> Result<u64> {
        let mut streams = self.streams.write();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream '{stream}'")))?;

        let index = (Self::hash_key(partition_key) % state.shards.len() as u64) as usize;
        let shard = &mut state.shards[index];

        let sequence = shard.next_sequence;
        shard.next_sequence += 1;
        shard.records.push(StoredRecord {
            sequence,
            partition_key: partition_key.to_string(),
            arrival_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0),
            data,
        });
        Ok(sequence)
    }

    async fn get_records(
        &self,
        stream: &str,
        shard_id: &str,
        from: ReadFrom,
        limit: usize,
    ) -> Result<RecordBatch> {
        let streams = self.streams.read();
        let state = streams
            .get(stream)
            .ok_or_else(|| AdapterError::Stream(format!("unknown stream '{stream}'")))?;
        let shard = state
            .shards
            .iter()
            .find(|s| s.shard_id == shard_id)
            .ok_or_else(|| {
                AdapterError::Stream(format!("unknown shard '{shard_id}' on stream '{stream}'"))
            })?;

        let start_after = match from {
            ReadFrom::Horizon => 0,
            ReadFrom::AfterSequence(sequence) => sequence,
            ReadFrom::Latest => shard.tip(),
            ReadFrom::AtTimestamp(t) => {
                let cutoff = t.timestamp_nanos_opt().unwrap_or(i64::MAX);
                // Records are in sequence order and arrival is monotonic,
                // so the position is the last record arriving before t.
                shard
                    .records
                    .iter()
                    .take_while(|r| r.arrival_ns < cutoff)
                    .last()
                    .map(|r| r.sequence)
                    .unwrap_or(0)
            }
        };

        let records: Vec<Record> = shard
            .records
            .iter()
            .filter(|r| r.sequence > start_after)
            .take(limit)
            .map(|r| Record {
                stream: stream.to_string(),
                shard: shard.shard_id.clone(),
                sequence_number: r.sequence,
                partition_key: r.partition_key.clone(),
                arrival_ns: r.arrival_ns,
                data: r.data.clone(),
            })
            .collect();

        let resume_after = records
            .last()
            .map(|r| r.sequence_number)
            .unwrap_or(start_after);

        Ok(RecordBatch {
            records,
            resume_after,
        })
    }
}
