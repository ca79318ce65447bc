//! Record and outbound message envelopes
//!
//! A [`Record`] is what the engine reads from a shard: the raw payload plus
//! the sequencing metadata the stream assigned to it. An [`OutboundMessage`]
//! is what the adapter delivers: the converted payload plus provenance
//! headers naming the stream, shard, partition key and sequence number.
//!
//! # Zero-Copy Design
//!
//! ```text
//! Shard read returns payload as Bytes
//!                  │
//!                  ▼
//! Converter sees payload.clone()   ← just increments refcount
//!                  │
//!                  ▼
//! OutboundMessage carries the converted Bytes to the output channel
//! ```
//!
//! Payloads are `Bytes` end to end; building the outbound envelope never
//! copies the record data.

use crate::headers;
use bytes::Bytes;
use std::collections::HashMap;
use ulid::Ulid;

/// A raw record as read from one shard of one stream
///
/// Records within a shard are strictly ordered by `sequence_number`;
/// no ordering is defined across shards or streams.
#[derive(Debug, Clone)]
pub struct Record {
    /// Stream the record was consumed from
    pub stream: String,

    /// Shard within the stream
    pub shard: String,

    /// Per-shard monotonic sequence number, starting at 1
    pub sequence_number: u64,

    /// Partition key supplied by the producer
    pub partition_key: String,

    /// Approximate arrival timestamp at the stream, unix nanoseconds
    pub arrival_ns: i64,

    /// Opaque payload - zero-copy via Bytes
    pub data: Bytes,
}

/// The delivered message envelope
///
/// Created once per successfully converted record, published once to the
/// output channel, and immutable in between. Headers use the stable keys in
/// [`headers`].
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use virta_core::{headers, OutboundMessage};
///
/// let msg = OutboundMessage::new(Bytes::from("payload"))
///     .with_header(headers::STREAM, "orders");
/// assert_eq!(msg.header(headers::STREAM), Some("orders"));
/// ```
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Unique delivery identifier
    pub id: Ulid,

    /// Converted payload - zero-copy via Bytes
    pub payload: Bytes,

    /// Provenance headers (see [`headers`] for the reserved keys)
    pub headers: HashMap<String, String>,
}

impl OutboundMessage {
    /// Create a new message with a fresh id and no headers
    pub fn new(payload: Bytes) -> Self {
        Self {
            id: Ulid::new(),
            payload,
            headers: HashMap::new(),
        }
    }

    /// Build the standard envelope for a consumed record
    ///
    /// `payload` is the converter output; sequencing and provenance headers
    /// are taken from the record itself.
    pub fn from_record(record: &Record, payload: Bytes) -> Self {
        Self::new(payload)
            .with_header(headers::SEQUENCE_NUMBER, record.sequence_number.to_string())
            .with_header(headers::STREAM, record.stream.clone())
            .with_header(headers::PARTITION_KEY, record.partition_key.clone())
            .with_header(headers::SHARD, record.shard.clone())
            .with_header(headers::ARRIVAL_TIMESTAMP, record.arrival_ns.to_string())
    }

    /// Add a header to the message
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get a header value by key
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Get payload as a string slice (if valid UTF-8)
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Get payload length in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
