//! Consumption engine
//!
//! An [`EngineSession`] is one running instance of the consumption engine:
//! it discovers shards across every configured stream, registers the
//! consumer group with each stream, acquires a lease per shard, and spawns
//! one worker task per lease. The session is owned by the adapter for
//! exactly one `start()`/`stop()` cycle.

mod worker;

use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::metrics::MetricsSink;
use crate::state::{Lease, LeaseKey, LeaseStore};
use crate::streams::StreamService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ulid::Ulid;
use virta_core::{Converter, InitialPosition, OutputChannel};

/// Everything a session needs, handed over by the adapter at `start()`
pub(crate) struct SessionParams {
    pub streams: Vec<String>,
    pub group: String,
    pub initial: InitialPosition,
    pub converter: Arc<dyn Converter>,
    pub channel: Arc<dyn OutputChannel>,
    pub stream_service: Arc<dyn StreamService>,
    pub lease_store: Arc<dyn LeaseStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub config: AdapterConfig,
}

/// Shared state for the shard workers of one session
pub(crate) struct WorkerContext {
    pub initial: InitialPosition,
    pub converter: Arc<dyn Converter>,
    pub channel: Arc<dyn OutputChannel>,
    pub stream_service: Arc<dyn StreamService>,
    pub lease_store: Arc<dyn LeaseStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub config: AdapterConfig,
    /// Lease owner id, unique per session
    pub owner: String,
}

/// One running consumption engine session
pub(crate) struct EngineSession {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl EngineSession {
    /// Bootstrap the session: register consumers, acquire leases, spawn
    /// workers
    ///
    /// Startup is all-or-nothing: if any stream cannot be described, any
    /// consumer registration fails, or any lease cannot be acquired, every
    /// lease acquired so far is released and the whole start fails.
    pub(crate) async fn start(params: SessionParams) -> Result<Self> {
        let owner = format!("worker-{}", Ulid::new());

        // Discover shards and register the consumer group, in stream
        // registration order. Registration is made idempotent here by
        // listing first; the collaborator itself refuses duplicates.
        let mut assignments: Vec<LeaseKey> = Vec::new();
        for stream in &params.streams {
            let desc = params
                .stream_service
                .describe_stream(stream)
                .await
                .map_err(|e| AdapterError::Init(format!("describe stream '{stream}': {e}")))?;

            let consumers = params
                .stream_service
                .list_consumers(&desc.arn)
                .await
                .map_err(|e| AdapterError::Init(format!("list consumers '{stream}': {e}")))?;
            if !consumers.iter().any(|c| c.name == params.group) {
                params
                    .stream_service
                    .register_consumer(&desc.arn, &params.group)
                    .await
                    .map_err(|e| {
                        AdapterError::Init(format!("register consumer on '{stream}': {e}"))
                    })?;
            }

            for shard in &desc.shards {
                assignments.push(LeaseKey::new(&params.group, stream, &shard.shard_id));
            }
        }

        let acquired = acquire_all(&params, &assignments, &owner).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(WorkerContext {
            initial: params.initial,
            converter: params.converter,
            channel: params.channel,
            stream_service: params.stream_service,
            lease_store: params.lease_store,
            metrics: params.metrics,
            config: params.config,
            owner,
        });

        let workers: Vec<JoinHandle<()>> = acquired
            .into_iter()
            .map(|(key, lease)| {
                tokio::spawn(worker::shard_worker(
                    Arc::clone(&ctx),
                    key,
                    lease,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(
            streams = params.streams.len(),
            group = %params.group,
            workers = workers.len(),
            "engine session started"
        );

        Ok(Self {
            shutdown: shutdown_tx,
            workers,
        })
    }

    /// Stop the session: signal workers, wait for them to drain, abort
    /// stragglers after the grace period
    ///
    /// When this returns, no worker publishes again: it either exited
    /// normally (after releasing its lease) or was aborted.
    pub(crate) async fn shutdown(self, grace: Duration) -> Result<()> {
        let _ = self.shutdown.send(true);

        let mut aborted = 0usize;
        for mut handle in self.workers {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("shard worker did not stop within grace period, aborting");
                handle.abort();
                aborted += 1;
            }
        }

        info!(aborted, "engine session stopped");
        if aborted > 0 {
            return Err(AdapterError::Shutdown(format!(
                "{aborted} shard workers exceeded the grace period"
            )));
        }
        Ok(())
    }
}

/// Acquire every lease, rolling back on the first failure
async fn acquire_all(
    params: &SessionParams,
    assignments: &[LeaseKey],
    owner: &str,
) -> Result<Vec<(LeaseKey, Lease)>> {
    let mut acquired: Vec<(LeaseKey, Lease)> = Vec::new();
    for key in assignments {
        match params.lease_store.acquire(key, owner).await {
            Ok(lease) => acquired.push((key.clone(), lease)),
            Err(e) => {
                for (held, _) in &acquired {
                    if let Err(release_err) = params.lease_store.release(held, owner).await {
                        warn!(lease = %held, error = %release_err, "rollback release failed");
                    }
                }
                return Err(AdapterError::Init(format!("acquire lease '{key}': {e}")));
            }
        }
    }
    Ok(acquired)
}
