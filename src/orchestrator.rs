//! Orchestrator facade. The single entry point for callers.
//!
//! Owns the worker pool and the dispatcher/autoscaler tasks, and provides
//! the submit/await protocol: append the item to the work stream, then
//! poll the result stream until a reply with a matching correlation ID
//! appears or the deadline passes. The result stream is read whole, with
//! no consumer group — every waiting caller must see every reply once —
//! and the matched entry is deleted, because a reply is meant for exactly
//! one caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchConfig, DispatchStats, Dispatcher};
use crate::error::{Error, Result};
use crate::llm::ReplyGenerator;
use crate::model::{NewWorkItem, PoolStatus, Reply, ThroughputStats, WorkerSnapshot};
use crate::pool::WorkerPool;
use crate::queue::MessageStream;
use crate::scale::{Autoscaler, ScaleConfig};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Configuration for the orchestrator and its background loops.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub dispatch: DispatchConfig,
    pub scale: ScaleConfig,
    /// Hard ceiling on pool size.
    pub max_workers: usize,
    /// How often a submit call re-reads the result stream.
    pub submit_poll_interval: Duration,
    /// Deadline for [`Orchestrator::submit`].
    pub submit_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            scale: ScaleConfig::default(),
            max_workers: 1000,
            submit_poll_interval: Duration::from_millis(100),
            submit_timeout: Duration::from_millis(5000),
        }
    }
}

struct Running {
    dispatcher: JoinHandle<Result<()>>,
    autoscaler: JoinHandle<Result<()>>,
}

/// The orchestration core: pool + dispatcher + autoscaler + submit/await.
pub struct Orchestrator {
    queue: Arc<dyn MessageStream>,
    pool: Arc<WorkerPool>,
    stats: Arc<DispatchStats>,
    dispatcher: Dispatcher,
    autoscaler: Arc<Autoscaler>,
    config: OrchestratorConfig,
    started_at: DateTime<Utc>,
    running: std::sync::Mutex<Option<Running>>,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<dyn MessageStream>,
        generator: Arc<dyn ReplyGenerator>,
        config: OrchestratorConfig,
    ) -> Self {
        let pool = Arc::new(WorkerPool::new(generator, config.max_workers));
        let stats = Arc::new(DispatchStats::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&pool),
            config.dispatch.clone(),
            Arc::clone(&stats),
        );
        let autoscaler = Arc::new(Autoscaler::new(
            Arc::clone(&queue),
            Arc::clone(&pool),
            config.scale.clone(),
        ));
        Self {
            queue,
            pool,
            stats,
            dispatcher,
            autoscaler,
            config,
            started_at: Utc::now(),
            running: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the dispatcher and autoscaler and bring the pool to its
    /// target size. Idempotent: a second start is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("orchestrator poisoned");
        if running.is_some() {
            return;
        }

        let size = self.pool.scale_to(self.config.scale.target_pool_size);

        let dispatcher = self.dispatcher.clone();
        let dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });
        let autoscaler = Arc::clone(&self.autoscaler);
        let autoscaler_handle = tokio::spawn(async move { autoscaler.run().await });

        *running = Some(Running {
            dispatcher: dispatcher_handle,
            autoscaler: autoscaler_handle,
        });
        info!(workers = size, "orchestrator started");
    }

    /// Stop both loops and wait for them to drain. In-flight processing
    /// finishes; future polls are cancelled.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .expect("orchestrator poisoned")
            .take();
        let Some(running) = running else { return };

        self.dispatcher.shutdown();
        self.autoscaler.shutdown();
        if let Err(e) = running.dispatcher.await {
            warn!("dispatcher task join failed: {e}");
        }
        if let Err(e) = running.autoscaler.await {
            warn!("autoscaler task join failed: {e}");
        }
        info!("orchestrator stopped");
    }

    /// Submit one inbound message and wait for its reply.
    ///
    /// Appends the item to the work stream, then polls the result stream
    /// for a reply tagged with the item's ID. On a match the entry is
    /// deleted and the reply returned. Past the deadline this fails with
    /// [`Error::ProcessingTimeout`]; the item may still complete later,
    /// leaving an orphaned reply for [`reap_stale_results`](Self::reap_stale_results).
    pub async fn submit(&self, new: NewWorkItem, timeout: Duration) -> Result<Reply> {
        let item = new.build();
        let payload = serde_json::to_value(&item)?;
        self.queue
            .append(&self.config.dispatch.work_stream, &payload)
            .await?;
        metrics::items_submitted().add(1, &[KeyValue::new("channel", item.channel.to_string())]);
        debug!(item_id = %item.id, channel = %item.channel, "item submitted");

        let start = tokio::time::Instant::now();
        let deadline = start + timeout;
        loop {
            match self
                .queue
                .read_all(&self.config.dispatch.result_stream)
                .await
            {
                Ok(entries) => {
                    for entry in entries {
                        let Ok(reply) = serde_json::from_value::<Reply>(entry.payload.clone())
                        else {
                            continue;
                        };
                        if reply.item_id == item.id {
                            // A reply is meant for exactly one caller.
                            if let Err(e) = self
                                .queue
                                .delete(&self.config.dispatch.result_stream, &entry.id)
                                .await
                            {
                                warn!(item_id = %item.id, "result cleanup failed: {e}");
                            }
                            return Ok(reply);
                        }
                    }
                }
                // Transient queue trouble mid-wait is not the caller's
                // problem; keep polling until the deadline.
                Err(e) => debug!(item_id = %item.id, "result poll failed: {e}"),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(Error::ProcessingTimeout {
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep_until(deadline.min(now + self.config.submit_poll_interval)).await;
        }
    }

    /// Submit with the configured default deadline.
    pub async fn submit_default(&self, new: NewWorkItem) -> Result<Reply> {
        self.submit(new, self.config.submit_timeout).await
    }

    // -- administrative surface -------------------------------------------

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn worker_snapshots(&self) -> Vec<WorkerSnapshot> {
        self.pool.snapshots()
    }

    /// Operator-driven scaling, clamped like any other scale request.
    pub fn scale_manually(&self, target: usize) -> usize {
        info!(target, "manual scale requested");
        self.pool.scale_to(target)
    }

    pub fn throughput_stats(&self) -> ThroughputStats {
        self.stats.snapshot()
    }

    pub async fn queue_depth(&self) -> Result<u64> {
        self.queue.len(&self.config.dispatch.work_stream).await
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Delete result-stream entries older than `max_age` — replies whose
    /// callers timed out and walked away. Opportunistic housekeeping,
    /// never required for correctness. Returns how many were removed.
    pub async fn reap_stale_results(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        let entries = self
            .queue
            .read_all(&self.config.dispatch.result_stream)
            .await?;
        let mut reaped = 0;
        for entry in entries {
            if entry.timestamp_millis().is_some_and(|ts| ts < cutoff) {
                self.queue
                    .delete(&self.config.dispatch.result_stream, &entry.id)
                    .await?;
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped, "stale results reaped");
        }
        Ok(reaped)
    }
}
