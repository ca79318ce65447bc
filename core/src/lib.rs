//! virta-core - Core types for the virta multi-stream consumer adapter
//!
//! This crate provides the types shared between the adapter engine and the
//! caller-supplied pieces of the pipeline:
//!
//! - [`Record`] - a raw record as read from a stream shard
//! - [`OutboundMessage`] - the delivered envelope (payload + provenance headers)
//! - [`Converter`] trait - pluggable byte-to-payload conversion
//! - [`OutputChannel`] trait - the single delivery sink all streams funnel into
//! - [`InitialPosition`] - where an uncheckpointed lease begins reading
//! - [`PluginError`] - error type for converter/channel implementations
//! - [`headers`] - stable outbound header-name constants
//!
//! # Why this crate exists
//!
//! Downstream consumers implement [`OutputChannel`] and custom [`Converter`]s
//! without needing the consumption engine. Keeping the contract types here
//! means a converter crate depends on `virta-core` only, while the adapter
//! crate can depend on those converter crates without a cycle.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod channel;
mod convert;
mod error;
/// Reserved outbound header key constants
pub mod headers;
mod position;
/// Record and outbound message envelopes
pub mod record;

pub use channel::OutputChannel;
pub use convert::{Converter, IdentityConverter, Utf8Converter};
pub use error::PluginError;
pub use position::InitialPosition;
pub use record::{OutboundMessage, Record};
