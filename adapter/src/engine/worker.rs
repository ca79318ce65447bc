//! Per-shard worker loop
//!
//! One worker task per shard lease. The worker owns the full record path
//! for its shard: poll → convert → publish → checkpoint, in sequence
//! order, so per-shard delivery order is preserved by construction.
//! Workers never share mutable state; a slow or backpressured shard only
//! ever delays itself.

use super::WorkerContext;
use crate::state::{Lease, LeaseKey};
use crate::streams::ReadFrom;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use virta_core::{OutboundMessage, Record};

/// Outcome of a publish-with-retry; tells the poll loop whether to keep
/// going or wind down
enum Publish {
    Delivered,
    ShuttingDown,
}

/// Run one shard lease until shutdown is signalled
///
/// Resumes from the lease checkpoint when one exists; otherwise the
/// adapter's initial position decides where reading begins.
pub(crate) async fn shard_worker(
    ctx: Arc<WorkerContext>,
    key: LeaseKey,
    lease: Lease,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut from = match lease.checkpoint {
        Some(sequence) => ReadFrom::AfterSequence(sequence),
        None => ReadFrom::from(ctx.initial),
    };

    ctx.metrics.lease_acquired(&key.stream);
    debug!(lease = %key, from = ?from, "shard worker started");

    'poll: loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break 'poll;
                }
            }
            _ = tokio::time::sleep(ctx.config.poll_interval) => {}
        }

        let batch = match ctx
            .stream_service
            .get_records(&key.stream, &key.shard, from, ctx.config.max_records_per_poll)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(lease = %key, error = %e, "shard poll failed");
                continue;
            }
        };

        if !batch.records.is_empty() {
            ctx.metrics
                .records_received(&key.stream, batch.records.len() as u64);
        }

        for record in &batch.records {
            let sequence = record.sequence_number;

            let payload = match ctx.converter.convert(record.data.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    // Dropped, never retried; other records are unaffected
                    warn!(lease = %key, sequence, error = %e, "conversion failed, record dropped");
                    ctx.metrics.conversion_failed(&key.stream);
                    advance(&ctx, &key, sequence).await;
                    from = ReadFrom::AfterSequence(sequence);
                    continue;
                }
            };

            let message = OutboundMessage::from_record(record, payload);
            match publish_with_retry(&ctx, &key, record, message, &mut shutdown).await {
                Publish::Delivered => {}
                // Not checkpointed; redelivered on the next start
                Publish::ShuttingDown => break 'poll,
            }

            ctx.metrics.messages_delivered(&key.stream, 1);
            advance(&ctx, &key, sequence).await;
            from = ReadFrom::AfterSequence(sequence);
        }

        from = ReadFrom::AfterSequence(batch.resume_after);
    }

    if let Err(e) = ctx.lease_store.release(&key, &ctx.owner).await {
        warn!(lease = %key, error = %e, "lease release failed");
    }
    ctx.metrics.lease_released(&key.stream);
    debug!(lease = %key, "shard worker stopped");
}

/// Publish one message, backing off exponentially while the channel
/// rejects it
///
/// Blocking here is confined to this worker; unrelated shards keep
/// flowing. The backoff is interruptible by shutdown, in which case the
/// message is abandoned un-checkpointed.
async fn publish_with_retry(
    ctx: &WorkerContext,
    key: &LeaseKey,
    record: &Record,
    message: OutboundMessage,
    shutdown: &mut watch::Receiver<bool>,
) -> Publish {
    let mut backoff = ctx.config.publish_backoff;
    loop {
        match ctx.channel.publish(message.clone()).await {
            Ok(()) => return Publish::Delivered,
            Err(e) => {
                warn!(
                    lease = %key,
                    sequence = record.sequence_number,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "publish failed, backing off"
                );
                ctx.metrics.publish_retried(&key.stream);

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return Publish::ShuttingDown;
                        }
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(ctx.config.publish_backoff_cap);
            }
        }
    }
}

/// Record delivery progress; a failed write only costs redelivery
async fn advance(ctx: &WorkerContext, key: &LeaseKey, sequence: u64) {
    if let Err(e) = ctx.lease_store.checkpoint(key, &ctx.owner, sequence).await {
        warn!(lease = %key, sequence, error = %e, "checkpoint write failed");
    }
}
