//! Delivery-path integration tests
//!
//! Validates the per-record pipeline invariants: per-shard ordering,
//! cross-stream independence (no head-of-line blocking), conversion
//! failure isolation, and publish retry with backoff.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use virta_adapter::{
    headers, ConsumerAdapter, MemoryLeaseStore, MemoryStreamService, MetricsSink,
    NoopMetricsSink, OutboundMessage, OutputChannel, PluginError, StreamService,
};

const RECEIVE_BUDGET: Duration = Duration::from_secs(5);

async fn recv_within(rx: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
    tokio::time::timeout(RECEIVE_BUDGET, rx.recv())
        .await
        .expect("no message within budget")
        .expect("channel closed")
}

/// Metrics sink that counts what the engine reports
#[derive(Default)]
struct CountingSink {
    received: AtomicU64,
    delivered: AtomicU64,
    conversion_failures: AtomicU64,
    publish_retries: AtomicU64,
}

impl MetricsSink for CountingSink {
    fn records_received(&self, _stream: &str, count: u64) {
        self.received.fetch_add(count, Ordering::SeqCst);
    }
    fn messages_delivered(&self, _stream: &str, count: u64) {
        self.delivered.fetch_add(count, Ordering::SeqCst);
    }
    fn conversion_failed(&self, _stream: &str) {
        self.conversion_failures.fetch_add(1, Ordering::SeqCst);
    }
    fn publish_retried(&self, _stream: &str) {
        self.publish_retries.fetch_add(1, Ordering::SeqCst);
    }
    fn lease_acquired(&self, _stream: &str) {}
    fn lease_released(&self, _stream: &str) {}
}

/// Records published to one shard arrive in publish order.
#[tokio::test]
async fn per_shard_order_is_preserved() {
    let service = Arc::new(MemoryStreamService::new());
    service.create_stream("orders", 1).await.unwrap();

    // Same partition key, so all twenty land on the one shard in order
    for i in 0..20 {
        service
            .put_record("orders", "customer-1", Bytes::from(format!("r{i}")))
            .await
            .unwrap();
    }

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
    let mut adapter = ConsumerAdapter::new(
        ["orders"],
        Arc::clone(&service) as Arc<dyn StreamService>,
        Arc::new(MemoryLeaseStore::new()),
        Arc::new(NoopMetricsSink),
    )
    .unwrap();
    adapter.set_consumer_group("g").unwrap();
    adapter.set_output_channel(tx).unwrap();
    adapter.start().await.unwrap();

    for i in 0..20 {
        let msg = recv_within(&mut rx).await;
        assert_eq!(msg.payload_str(), Some(format!("r{i}").as_str()));
        assert_eq!(
            msg.header(headers::SEQUENCE_NUMBER),
            Some((i + 1).to_string().as_str())
        );
    }

    adapter.stop().await.unwrap();
}

/// A silent stream must not delay delivery from an active one.
#[tokio::test]
async fn silent_stream_does_not_block_active_stream() {
    let service = Arc::new(MemoryStreamService::new());
    service.create_stream("active", 1).await.unwrap();
    service.create_stream("silent", 1).await.unwrap();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
    let mut adapter = ConsumerAdapter::new(
        ["silent", "active"],
        Arc::clone(&service) as Arc<dyn StreamService>,
        Arc::new(MemoryLeaseStore::new()),
        Arc::new(NoopMetricsSink),
    )
    .unwrap();
    adapter.set_consumer_group("g").unwrap();
    adapter.set_output_channel(tx).unwrap();
    adapter.start().await.unwrap();

    // "silent" never sees traffic; "active" must still flow promptly
    service
        .put_record("active", "k", Bytes::from("ping"))
        .await
        .unwrap();

    let msg = recv_within(&mut rx).await;
    assert_eq!(msg.header(headers::STREAM), Some("active"));
    assert_eq!(msg.payload_str(), Some("ping"));

    adapter.stop().await.unwrap();
}

/// A record the converter rejects is dropped and counted; neighbours on
/// the same shard are unaffected.
#[tokio::test]
async fn conversion_failure_drops_only_that_record() {
    let service = Arc::new(MemoryStreamService::new());
    service.create_stream("orders", 1).await.unwrap();
    let sink = Arc::new(CountingSink::default());

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
    let mut adapter = ConsumerAdapter::new(
        ["orders"],
        Arc::clone(&service) as Arc<dyn StreamService>,
        Arc::new(MemoryLeaseStore::new()),
        Arc::clone(&sink) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    adapter.set_consumer_group("g").unwrap();
    adapter
        .set_converter(|data: Bytes| -> Result<Bytes, PluginError> {
            if data.as_ref() == b"poison" {
                Err(PluginError::Convert("poison payload".to_string()))
            } else {
                Ok(data)
            }
        })
        .unwrap();
    adapter.set_output_channel(tx).unwrap();
    adapter.start().await.unwrap();

    service
        .put_record("orders", "k", Bytes::from("good-1"))
        .await
        .unwrap();
    service
        .put_record("orders", "k", Bytes::from("poison"))
        .await
        .unwrap();
    service
        .put_record("orders", "k", Bytes::from("good-2"))
        .await
        .unwrap();

    assert_eq!(recv_within(&mut rx).await.payload_str(), Some("good-1"));
    assert_eq!(recv_within(&mut rx).await.payload_str(), Some("good-2"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(sink.received.load(Ordering::SeqCst), 3);
    assert_eq!(sink.conversion_failures.load(Ordering::SeqCst), 1);
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 2);

    adapter.stop().await.unwrap();

    // The poison record was skipped for good: not redelivered on restart
    adapter.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    adapter.stop().await.unwrap();
}

/// Output channel that rejects the first few publishes, then recovers
struct FlakyChannel {
    inner: mpsc::Sender<OutboundMessage>,
    failures_left: AtomicU64,
}

#[async_trait]
impl OutputChannel for FlakyChannel {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PluginError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PluginError::Publish("transient outage".to_string()));
        }
        self.inner
            .send(message)
            .await
            .map_err(|e| PluginError::Publish(e.to_string()))
    }
}

/// Publish failures pause the shard and are retried with backoff; the
/// record is delivered once the channel recovers, exactly once.
#[tokio::test]
async fn publish_failures_are_retried() {
    let service = Arc::new(MemoryStreamService::new());
    service.create_stream("orders", 1).await.unwrap();
    let sink = Arc::new(CountingSink::default());

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
    let mut adapter = ConsumerAdapter::new(
        ["orders"],
        Arc::clone(&service) as Arc<dyn StreamService>,
        Arc::new(MemoryLeaseStore::new()),
        Arc::clone(&sink) as Arc<dyn MetricsSink>,
    )
    .unwrap();
    adapter.set_consumer_group("g").unwrap();
    adapter
        .set_output_channel(FlakyChannel {
            inner: tx,
            failures_left: AtomicU64::new(3),
        })
        .unwrap();
    adapter.start().await.unwrap();

    service
        .put_record("orders", "k", Bytes::from("persistent"))
        .await
        .unwrap();

    let msg = recv_within(&mut rx).await;
    assert_eq!(msg.payload_str(), Some("persistent"));
    assert_eq!(sink.publish_retries.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err(), "retries must not duplicate delivery");

    adapter.stop().await.unwrap();
}

/// Multiple shards on one stream all reach the channel; per-shard order
/// holds even when interleaved.
#[tokio::test]
async fn multi_shard_stream_delivers_all_records() {
    let service = Arc::new(MemoryStreamService::new());
    service.create_stream("orders", 4).await.unwrap();

    // Distinct partition keys spread the records across shards
    for i in 0..40 {
        service
            .put_record("orders", &format!("key-{i}"), Bytes::from(format!("r{i}")))
            .await
            .unwrap();
    }

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(64);
    let mut adapter = ConsumerAdapter::new(
        ["orders"],
        Arc::clone(&service) as Arc<dyn StreamService>,
        Arc::new(MemoryLeaseStore::new()),
        Arc::new(NoopMetricsSink),
    )
    .unwrap();
    adapter.set_consumer_group("g").unwrap();
    adapter.set_output_channel(tx).unwrap();
    adapter.start().await.unwrap();

    let mut payloads = Vec::new();
    let mut last_sequence_per_shard: std::collections::HashMap<String, u64> =
        std::collections::HashMap::new();
    for _ in 0..40 {
        let msg = recv_within(&mut rx).await;
        let shard = msg.header(headers::SHARD).unwrap().to_string();
        let sequence: u64 = msg.header(headers::SEQUENCE_NUMBER).unwrap().parse().unwrap();

        // Sequence numbers within one shard must be strictly increasing
        if let Some(previous) = last_sequence_per_shard.insert(shard.clone(), sequence) {
            assert!(sequence > previous, "shard {shard} went backwards");
        }
        payloads.push(msg.payload_str().unwrap().to_string());
    }

    payloads.sort();
    let mut expected: Vec<String> = (0..40).map(|i| format!("r{i}")).collect();
    expected.sort();
    assert_eq!(payloads, expected);

    adapter.stop().await.unwrap();
}
