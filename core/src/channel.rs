//! Output channel trait for virta message delivery
//!
//! The [`OutputChannel`] is the single sink every configured stream funnels
//! into. It is owned by the caller; the adapter only publishes to it and
//! never closes it.

use crate::error::PluginError;
use crate::record::OutboundMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Output channel trait - receives every delivered message
///
/// One channel instance is shared by all shard workers across all streams,
/// so implementations must be `Send + Sync` and safe to publish to
/// concurrently. A publish may suspend under backpressure; the engine
/// confines that suspension to the worker owning the record's shard.
///
/// # Implementation Requirements
///
/// - Publishing must preserve the relative order of calls made by one
///   worker (per-shard order); no cross-worker ordering is expected.
/// - A returned error means the message was not accepted; the engine will
///   retry with backoff and the shard's checkpoint does not advance.
///
/// # Example
///
/// ```ignore
/// use virta_core::{OutboundMessage, OutputChannel, PluginError};
/// use async_trait::async_trait;
///
/// struct HttpSink {
///     client: reqwest::Client,
///     endpoint: String,
/// }
///
/// #[async_trait]
/// impl OutputChannel for HttpSink {
///     async fn publish(&self, message: OutboundMessage) -> Result<(), PluginError> {
///         self.client.post(&self.endpoint)
///             .body(message.payload)
///             .send()
///             .await
///             .map_err(|e| PluginError::Publish(e.to_string()))?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Publish one message to the sink
    ///
    /// # Errors
    ///
    /// `PluginError::Publish` if the sink rejected the message or is
    /// unreachable.
    async fn publish(&self, message: OutboundMessage) -> Result<(), PluginError>;
}

/// Bounded tokio mpsc senders are output channels out of the box
///
/// `send` suspends when the channel is full, which is exactly the
/// backpressure contract the engine expects.
#[async_trait]
impl OutputChannel for mpsc::Sender<OutboundMessage> {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PluginError> {
        self.send(message)
            .await
            .map_err(|e| PluginError::Publish(e.to_string()))
    }
}
