//! Prometheus metrics and the metrics-sink collaborator
//!
//! The engine never reports telemetry directly; it goes through the
//! [`MetricsSink`] trait, which is fire-and-forget by construction - every
//! method takes `&self`, returns nothing, and must never block or fail in a
//! way that affects record delivery.
//!
//! [`PrometheusSink`] forwards into a process-global prometheus registry;
//! [`NoopMetricsSink`] discards everything.

use crate::error::{AdapterError, Result};
use prometheus::{
    register_counter_vec, register_gauge, CounterVec, Gauge,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All virta adapter metrics
pub struct Metrics {
    /// Records read from shards (by stream)
    pub records_received: CounterVec,

    /// Messages delivered to the output channel (by stream)
    pub messages_delivered: CounterVec,

    /// Records dropped because the converter rejected them (by stream)
    pub conversion_failures: CounterVec,

    /// Publish attempts that failed and were retried (by stream)
    pub publish_retries: CounterVec,

    /// Shard leases currently held by this adapter
    pub active_leases: Gauge,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        // Serialize first-time registration: two racing callers would both
        // try to register and one would get an AlreadyReg error.
        static INIT: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }
        let _guard = INIT.lock();
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            records_received: register_counter_vec!(
                "virta_records_received_total",
                "Total records read from stream shards",
                &["stream"]
            )
            .map_err(|e| AdapterError::Metrics(format!("records_received: {e}")))?,

            messages_delivered: register_counter_vec!(
                "virta_messages_delivered_total",
                "Total messages delivered to the output channel",
                &["stream"]
            )
            .map_err(|e| AdapterError::Metrics(format!("messages_delivered: {e}")))?,

            conversion_failures: register_counter_vec!(
                "virta_conversion_failures_total",
                "Total records dropped by the converter",
                &["stream"]
            )
            .map_err(|e| AdapterError::Metrics(format!("conversion_failures: {e}")))?,

            publish_retries: register_counter_vec!(
                "virta_publish_retries_total",
                "Total failed publish attempts that were retried",
                &["stream"]
            )
            .map_err(|e| AdapterError::Metrics(format!("publish_retries: {e}")))?,

            active_leases: register_gauge!(
                "virta_active_leases",
                "Shard leases currently held"
            )
            .map_err(|e| AdapterError::Metrics(format!("active_leases: {e}")))?,
        };

        Ok(METRICS.get_or_init(|| metrics))
    }

    /// Get the metrics instance if initialized
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }
}

/// Metrics-sink collaborator
///
/// Injected into the adapter alongside the stream and lease collaborators.
/// Implementations are opaque to the engine; a failing sink must swallow
/// its own errors.
pub trait MetricsSink: Send + Sync {
    /// Records read from a shard of `stream`
    fn records_received(&self, stream: &str, count: u64);

    /// Messages delivered to the output channel from `stream`
    fn messages_delivered(&self, stream: &str, count: u64);

    /// A record from `stream` was dropped by the converter
    fn conversion_failed(&self, stream: &str);

    /// A publish from `stream` failed and will be retried
    fn publish_retried(&self, stream: &str);

    /// A shard lease on `stream` was acquired
    fn lease_acquired(&self, stream: &str);

    /// A shard lease on `stream` was released
    fn lease_released(&self, stream: &str);
}

/// Sink that discards all telemetry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn records_received(&self, _stream: &str, _count: u64) {}
    fn messages_delivered(&self, _stream: &str, _count: u64) {}
    fn conversion_failed(&self, _stream: &str) {}
    fn publish_retried(&self, _stream: &str) {}
    fn lease_acquired(&self, _stream: &str) {}
    fn lease_released(&self, _stream: &str) {}
}

/// Sink backed by the process-global prometheus registry
///
/// Construction initializes the registry; if another component already did,
/// the existing instance is reused.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl PrometheusSink {
    /// Create the sink, initializing the global registry if needed
    pub fn new() -> Result<Self> {
        Metrics::init()?;
        Ok(Self)
    }
}

impl MetricsSink for PrometheusSink {
    fn records_received(&self, stream: &str, count: u64) {
        if let Some(m) = Metrics::get() {
            m.records_received
                .with_label_values(&[stream])
                .inc_by(count as f64);
        }
    }

    fn messages_delivered(&self, stream: &str, count: u64) {
        if let Some(m) = Metrics::get() {
            m.messages_delivered
                .with_label_values(&[stream])
                .inc_by(count as f64);
        }
    }

    fn conversion_failed(&self, stream: &str) {
        if let Some(m) = Metrics::get() {
            m.conversion_failures.with_label_values(&[stream]).inc();
        }
    }

    fn publish_retried(&self, stream: &str) {
        if let Some(m) = Metrics::get() {
            m.publish_retries.with_label_values(&[stream]).inc();
        }
    }

    fn lease_acquired(&self, _stream: &str) {
        if let Some(m) = Metrics::get() {
            m.active_leases.inc();
        }
    }

    fn lease_released(&self, _stream: &str) {
        if let Some(m) = Metrics::get() {
            m.active_leases.dec();
        }
    }
}
