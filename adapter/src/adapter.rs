//! The multi-stream consumer adapter
//!
//! [`ConsumerAdapter`] owns the mapping from a set of named streams to a
//! single output channel: one consumer group across all streams, one
//! converter, one delivery sink. It drives an internal
//! [`EngineSession`](crate::engine) for its `start()`/`stop()` lifetime and
//! performs no per-record work itself.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use virta_adapter::{ConsumerAdapter, MemoryLeaseStore, MemoryStreamService, NoopMetricsSink};
//! use virta_core::{InitialPosition, OutboundMessage};
//!
//! let service = Arc::new(MemoryStreamService::new());
//! let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
//!
//! let mut adapter = ConsumerAdapter::new(
//!     ["orders", "payments"],
//!     service,
//!     Arc::new(MemoryLeaseStore::new()),
//!     Arc::new(NoopMetricsSink),
//! )?;
//! adapter.set_consumer_group("billing")?;
//! adapter.set_stream_initial_sequence(InitialPosition::TrimHorizon)?;
//! adapter.set_output_channel(tx)?;
//! adapter.start().await?;
//! ```

use crate::config::AdapterConfig;
use crate::engine::{EngineSession, SessionParams};
use crate::error::{AdapterError, Result};
use crate::metrics::MetricsSink;
use crate::state::LeaseStore;
use crate::streams::StreamService;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use virta_core::{Converter, IdentityConverter, InitialPosition, OutputChannel};

/// Adapter lifecycle states
///
/// ```text
/// Created ──► Starting ──► Running ──► Stopping ──► Stopped
///                │            │                        │
///                ▼            ▼                        │
///              Failed ◄───────┘      start() ◄─────────┘
/// ```
///
/// `Failed` is re-startable: a retry after remediation is treated as a
/// fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Constructed, never started
    Created,
    /// `start()` in progress
    Starting,
    /// Engine session live, records flowing
    Running,
    /// `stop()` in progress, workers draining
    Stopping,
    /// Cleanly stopped; may be started again
    Stopped,
    /// Startup or runtime failure; may be started again after remediation
    Failed,
}

impl AdapterState {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Message-driven adapter consuming N streams into one output channel
///
/// Construction fixes the stream set and the collaborator handles; the
/// remaining configuration is settable until the first `start()` and
/// immutable while the adapter is running.
pub struct ConsumerAdapter {
    streams: Vec<String>,
    stream_service: Arc<dyn StreamService>,
    lease_store: Arc<dyn LeaseStore>,
    metrics: Arc<dyn MetricsSink>,

    config: AdapterConfig,
    initial_position: InitialPosition,
    converter: Arc<dyn Converter>,
    consumer_group: Option<String>,
    output_channel: Option<Arc<dyn OutputChannel>>,

    state: AdapterState,
    session: Option<EngineSession>,
}

impl ConsumerAdapter {
    /// Create an adapter for the given streams and collaborators
    ///
    /// # Errors
    ///
    /// `AdapterError::Config` if the stream set is empty or contains
    /// duplicates.
    pub fn new<I, S>(
        streams: I,
        stream_service: Arc<dyn StreamService>,
        lease_store: Arc<dyn LeaseStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let streams: Vec<String> = streams.into_iter().map(Into::into).collect();
        if streams.is_empty() {
            return Err(AdapterError::Config("stream set is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.as_str()) {
                return Err(AdapterError::Config(format!(
                    "duplicate stream '{stream}'"
                )));
            }
        }

        Ok(Self {
            streams,
            stream_service,
            lease_store,
            metrics,
            config: AdapterConfig::default(),
            initial_position: InitialPosition::default(),
            converter: Arc::new(IdentityConverter),
            consumer_group: None,
            output_channel: None,
            state: AdapterState::Created,
            session: None,
        })
    }

    /// Streams this adapter consumes, in registration order
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// Current lifecycle state
    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Set the initial read position applied uniformly to every stream
    ///
    /// Only consulted for leases without a checkpoint.
    pub fn set_stream_initial_sequence(&mut self, position: InitialPosition) -> Result<()> {
        self.ensure_configurable()?;
        self.initial_position = position;
        Ok(())
    }

    /// Install the record converter; identity/pass-through if never set
    pub fn set_converter(&mut self, converter: impl Converter + 'static) -> Result<()> {
        self.ensure_configurable()?;
        self.converter = Arc::new(converter);
        Ok(())
    }

    /// Set the consumer group shared across all configured streams
    ///
    /// # Errors
    ///
    /// `AdapterError::Config` if the name is blank.
    pub fn set_consumer_group(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_configurable()?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AdapterError::Config("consumer group is blank".to_string()));
        }
        self.consumer_group = Some(name);
        Ok(())
    }

    /// Set the output channel all streams deliver into
    ///
    /// The channel is owned by the caller; the adapter publishes to it and
    /// never closes it.
    pub fn set_output_channel(&mut self, channel: impl OutputChannel + 'static) -> Result<()> {
        self.ensure_configurable()?;
        self.output_channel = Some(Arc::new(channel));
        Ok(())
    }

    /// Override the engine tuning parameters
    pub fn set_config(&mut self, config: AdapterConfig) -> Result<()> {
        self.ensure_configurable()?;
        self.config = config;
        Ok(())
    }

    /// Start consuming
    ///
    /// Valid from `Created`, `Stopped` or `Failed`. Validates the
    /// configuration, then brings up one engine session covering every
    /// configured stream. On any failure the adapter lands in `Failed`
    /// with no partial startup left behind, and the first error is
    /// returned.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            AdapterState::Created | AdapterState::Stopped | AdapterState::Failed => {}
            state => {
                return Err(AdapterError::State(format!(
                    "start() is not valid while {}",
                    state.name()
                )));
            }
        }
        self.state = AdapterState::Starting;

        let group = match &self.consumer_group {
            Some(group) => group.clone(),
            None => {
                self.state = AdapterState::Failed;
                return Err(AdapterError::Config("consumer group not set".to_string()));
            }
        };
        let channel = match &self.output_channel {
            Some(channel) => Arc::clone(channel),
            None => {
                self.state = AdapterState::Failed;
                return Err(AdapterError::Config("output channel not set".to_string()));
            }
        };

        info!(
            streams = self.streams.len(),
            group = %group,
            position = ?self.initial_position,
            "starting consumer adapter"
        );

        let params = SessionParams {
            streams: self.streams.clone(),
            group,
            initial: self.initial_position,
            converter: Arc::clone(&self.converter),
            channel,
            stream_service: Arc::clone(&self.stream_service),
            lease_store: Arc::clone(&self.lease_store),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        };

        match EngineSession::start(params).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = AdapterState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = AdapterState::Failed;
                error!(error = %e, "consumer adapter failed to start");
                Err(e)
            }
        }
    }

    /// Stop consuming
    ///
    /// Valid from `Running`; idempotent from `Created`, `Stopped` and
    /// `Failed`. Signals every shard worker, waits (bounded by the
    /// configured grace period) for in-flight deliveries to drain and
    /// leases to be released. No publish happens after this returns.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            AdapterState::Running => {}
            AdapterState::Created | AdapterState::Stopped | AdapterState::Failed => {
                return Ok(());
            }
            state => {
                return Err(AdapterError::State(format!(
                    "stop() is not valid while {}",
                    state.name()
                )));
            }
        }
        self.state = AdapterState::Stopping;

        let result = match self.session.take() {
            Some(session) => session.shutdown(self.config.shutdown_grace).await,
            None => Ok(()),
        };

        self.state = AdapterState::Stopped;
        info!("consumer adapter stopped");
        result
    }

    fn ensure_configurable(&self) -> Result<()> {
        match self.state {
            AdapterState::Created | AdapterState::Stopped | AdapterState::Failed => Ok(()),
            state => Err(AdapterError::Config(format!(
                "configuration is immutable while {}",
                state.name()
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetricsSink;
    use crate::state::MemoryLeaseStore;
    use crate::streams::MemoryStreamService;
    use tokio::sync::mpsc;
    use virta_core::OutboundMessage;

    fn adapter_for(streams: &[&str]) -> Result<ConsumerAdapter> {
        ConsumerAdapter::new(
            streams.iter().copied(),
            Arc::new(MemoryStreamService::new()),
            Arc::new(MemoryLeaseStore::new()),
            Arc::new(NoopMetricsSink),
        )
    }

    #[test]
    fn test_new_starts_created() {
        let adapter = adapter_for(&["a", "b"]).unwrap();
        assert_eq!(adapter.state(), AdapterState::Created);
        assert_eq!(adapter.streams(), &["a", "b"]);
    }

    #[test]
    fn test_empty_stream_set_is_rejected() {
        let result = adapter_for(&[]);
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_duplicate_streams_are_rejected() {
        let result = adapter_for(&["a", "b", "a"]);
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_blank_consumer_group_is_rejected() {
        let mut adapter = adapter_for(&["a"]).unwrap();
        assert!(matches!(
            adapter.set_consumer_group("   "),
            Err(AdapterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_group_fails_fast() {
        let mut adapter = adapter_for(&["a"]).unwrap();
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        adapter.set_output_channel(tx).unwrap();

        let result = adapter.start().await;
        assert!(matches!(result, Err(AdapterError::Config(_))));
        assert_eq!(adapter.state(), AdapterState::Failed);
    }

    #[tokio::test]
    async fn test_start_without_channel_fails_fast() {
        let mut adapter = adapter_for(&["a"]).unwrap();
        adapter.set_consumer_group("g").unwrap();

        let result = adapter.start().await;
        assert!(matches!(result, Err(AdapterError::Config(_))));
        assert_eq!(adapter.state(), AdapterState::Failed);
    }

    #[tokio::test]
    async fn test_start_unknown_stream_enters_failed() {
        // Stream never provisioned on the backend
        let mut adapter = adapter_for(&["ghost"]).unwrap();
        adapter.set_consumer_group("g").unwrap();
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        adapter.set_output_channel(tx).unwrap();

        let result = adapter.start().await;
        assert!(matches!(result, Err(AdapterError::Init(_))));
        assert_eq!(adapter.state(), AdapterState::Failed);
    }

    #[tokio::test]
    async fn test_failed_adapter_can_retry_start() {
        let service = Arc::new(MemoryStreamService::new());
        let mut adapter = ConsumerAdapter::new(
            ["late"],
            Arc::clone(&service) as Arc<dyn StreamService>,
            Arc::new(MemoryLeaseStore::new()),
            Arc::new(NoopMetricsSink),
        )
        .unwrap();
        adapter.set_consumer_group("g").unwrap();
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        adapter.set_output_channel(tx).unwrap();

        assert!(adapter.start().await.is_err());
        assert_eq!(adapter.state(), AdapterState::Failed);

        // Remediate: provision the stream, then retry
        service.create_stream("late", 1).await.unwrap();
        adapter.start().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Running);

        adapter.stop().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_before_start() {
        let mut adapter = adapter_for(&["a"]).unwrap();
        adapter.stop().await.unwrap();
        assert_eq!(adapter.state(), AdapterState::Created);
    }

    #[tokio::test]
    async fn test_configuration_is_frozen_while_running() {
        let service = Arc::new(MemoryStreamService::new());
        service.create_stream("a", 1).await.unwrap();

        let mut adapter = ConsumerAdapter::new(
            ["a"],
            service as Arc<dyn StreamService>,
            Arc::new(MemoryLeaseStore::new()),
            Arc::new(NoopMetricsSink),
        )
        .unwrap();
        adapter.set_consumer_group("g").unwrap();
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        adapter.set_output_channel(tx).unwrap();
        adapter.start().await.unwrap();

        assert!(matches!(
            adapter.set_consumer_group("other"),
            Err(AdapterError::Config(_))
        ));
        assert!(matches!(
            adapter.set_stream_initial_sequence(InitialPosition::Latest),
            Err(AdapterError::Config(_))
        ));

        adapter.stop().await.unwrap();

        // Settable again once stopped
        adapter.set_consumer_group("other").unwrap();
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let service = Arc::new(MemoryStreamService::new());
        service.create_stream("a", 1).await.unwrap();

        let mut adapter = ConsumerAdapter::new(
            ["a"],
            service as Arc<dyn StreamService>,
            Arc::new(MemoryLeaseStore::new()),
            Arc::new(NoopMetricsSink),
        )
        .unwrap();
        adapter.set_consumer_group("g").unwrap();
        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        adapter.set_output_channel(tx).unwrap();
        adapter.start().await.unwrap();

        let result = adapter.start().await;
        assert!(matches!(result, Err(AdapterError::State(_))));
        // Still running; the rejected call must not disturb the session
        assert_eq!(adapter.state(), AdapterState::Running);

        adapter.stop().await.unwrap();
    }
}
