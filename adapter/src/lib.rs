//! virta-adapter - multi-stream consumer adapter
//!
//! Consumes records from several named streams with one shared consumer
//! group and delivers every record, converted and header-enriched, onto a
//! single caller-owned output channel.
//!
//! # Architecture
//!
//! ```text
//! stream A ──┐
//! stream B ──┼──► engine session ──► converter ──► output channel
//! stream C ──┘    (1 worker/shard)
//! ```
//!
//! The adapter owns the lifecycle; the caller owns the channel. Per-shard
//! delivery order is preserved, cross-stream order is not. Collaborators
//! (stream management, lease/checkpoint storage, metrics) are injected as
//! trait handles, so the whole pipeline runs against the in-memory
//! implementations in tests.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

mod adapter;
pub mod config;
mod engine;
pub mod error;
pub mod metrics;
pub mod state;
pub mod streams;

pub use adapter::{AdapterState, ConsumerAdapter};
pub use config::AdapterConfig;
pub use error::{AdapterError, PluginError, Result};
pub use metrics::{Metrics, MetricsSink, NoopMetricsSink, PrometheusSink};
pub use state::{Lease, LeaseKey, LeaseStore, MemoryLeaseStore};
pub use streams::{
    ConsumerInfo, MemoryStreamService, ReadFrom, RecordBatch, ShardInfo, StreamDescription,
    StreamService,
};

// Re-export the core contract types so downstream code can depend on this
// crate alone
pub use virta_core::{
    headers, Converter, IdentityConverter, InitialPosition, OutboundMessage, OutputChannel,
    Record, Utf8Converter,
};
