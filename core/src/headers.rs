//! Reserved outbound header key constants for virta messages
//!
//! These keys form the stable contract with downstream consumers: every
//! delivered [`OutboundMessage`](crate::OutboundMessage) carries them so a
//! consumer can recover record provenance without coupling to any specific
//! stream backend.

/// Per-shard sequence number of the source record (decimal string)
pub const SEQUENCE_NUMBER: &str = "virta.sequence_number";

/// Name of the stream the record was consumed from
pub const STREAM: &str = "virta.stream";

/// Partition key the producer supplied with the record
pub const PARTITION_KEY: &str = "virta.partition_key";

/// Shard the record was read from
pub const SHARD: &str = "virta.shard";

/// Approximate arrival timestamp at the stream, unix nanoseconds (decimal string)
pub const ARRIVAL_TIMESTAMP: &str = "virta.arrival_timestamp";
