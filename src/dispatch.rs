//! Dispatch loop: moves work items from the work stream to idle workers
//! and publishes their replies.
//!
//! One invariant anchors the loop: a reply is appended to the result
//! stream before its delivery is acked. An ack-first ordering could lose
//! a reply the submitter is still waiting on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Reply, ThroughputStats, WorkItem};
use crate::pool::WorkerPool;
use crate::queue::{MessageStream, StreamEntry};
use crate::telemetry::dispatch::start_item_span;
use crate::worker::Worker;

/// Configuration for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub work_stream: String,
    pub result_stream: String,
    pub group: String,
    /// Consumer name within the group. Unique per process.
    pub consumer: String,
    /// Max entries per read from the work stream.
    pub batch_size: usize,
    /// How long one read blocks when the work stream is empty.
    pub poll_block: Duration,
    /// Delay before retrying after a queue I/O error.
    pub retry_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            work_stream: "work_items".to_string(),
            result_stream: "reply_results".to_string(),
            group: "reply_workers".to_string(),
            consumer: format!("dispatcher-{}", &Uuid::new_v4().to_string()[..8]),
            batch_size: 10,
            poll_block: Duration::from_millis(1000),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Cumulative throughput counters shared with the facade.
#[derive(Default)]
pub struct DispatchStats {
    inner: std::sync::Mutex<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    processed: u64,
    escalated: u64,
    total_latency_ms: u64,
}

impl DispatchStats {
    pub fn record(&self, reply: &Reply) {
        let mut inner = self.inner.lock().expect("stats poisoned");
        inner.processed += 1;
        if reply.escalated {
            inner.escalated += 1;
        }
        inner.total_latency_ms += reply.processing_time_ms;
    }

    pub fn snapshot(&self) -> ThroughputStats {
        let inner = self.inner.lock().expect("stats poisoned");
        ThroughputStats {
            processed: inner.processed,
            escalated: inner.escalated,
            avg_latency_ms: if inner.processed == 0 {
                0.0
            } else {
                inner.total_latency_ms as f64 / inner.processed as f64
            },
        }
    }
}

/// The dispatch loop: read a batch, assign idle workers, publish replies,
/// ack deliveries.
pub struct Dispatcher {
    queue: Arc<dyn MessageStream>,
    pool: Arc<WorkerPool>,
    config: DispatchConfig,
    stats: Arc<DispatchStats>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            pool: Arc::clone(&self.pool),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            shutdown: Arc::clone(&self.shutdown),
            stopped: Arc::clone(&self.stopped),
        }
    }
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn MessageStream>,
        pool: Arc<WorkerPool>,
        config: DispatchConfig,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            queue,
            pool,
            config,
            stats,
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal the loop to stop. Future polls are cancelled; already-started
    /// processing drains.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.shutdown.notify_waiters();
    }

    /// Run until shutdown. Queue errors are logged and retried; the loop
    /// never terminates on its own.
    pub async fn run(&self) -> Result<()> {
        // Group creation is idempotent, but the store may not be up yet.
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return Ok(());
            }
            match self
                .queue
                .create_group(&self.config.work_stream, &self.config.group)
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    warn!("consumer group init failed: {e}, retrying");
                    tokio::select! {
                        _ = self.shutdown.notified() => return Ok(()),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }

        info!(
            group = %self.config.group,
            consumer = %self.config.consumer,
            "dispatcher started"
        );

        loop {
            // A shutdown signaled during dispatch_batch lands on the flag,
            // not on a registered waiter.
            if self.stopped.load(Ordering::Relaxed) {
                info!("dispatcher shutting down");
                return Ok(());
            }
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("dispatcher shutting down");
                    return Ok(());
                }
                read = self.queue.read_group(
                    &self.config.work_stream,
                    &self.config.group,
                    &self.config.consumer,
                    self.config.batch_size,
                    self.config.poll_block,
                ) => match read {
                    Ok(entries) if !entries.is_empty() => {
                        self.dispatch_batch(entries).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("work stream read failed: {e}, retrying");
                        tokio::select! {
                            _ = self.shutdown.notified() => return Ok(()),
                            _ = tokio::time::sleep(self.config.retry_delay) => {}
                        }
                    }
                }
            }
        }
    }

    /// Assign each delivered entry to an idle worker and process the
    /// matched ones concurrently. Entries with no idle worker stay
    /// unacknowledged and come back on a later pass.
    async fn dispatch_batch(&self, entries: Vec<StreamEntry>) {
        let mut tasks = JoinSet::new();

        for entry in entries {
            let item: WorkItem = match serde_json::from_value(entry.payload.clone()) {
                Ok(item) => item,
                Err(e) => {
                    // A poison entry must not wedge the group.
                    warn!(entry_id = %entry.id, "undecodable work payload, dropping: {e}");
                    if let Err(e) = self
                        .queue
                        .ack(&self.config.work_stream, &self.config.group, &entry.id)
                        .await
                    {
                        warn!(entry_id = %entry.id, "ack of poison entry failed: {e}");
                    }
                    continue;
                }
            };

            let Some(worker) = self.pool.acquire_idle(item.id) else {
                debug!(item_id = %item.id, "no idle worker, leaving delivery pending");
                continue;
            };

            let this = self.clone();
            tasks.spawn(async move {
                this.process_entry(worker, item, entry.id).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    async fn process_entry(&self, worker: Arc<Worker>, item: WorkItem, delivery_id: String) {
        let span = start_item_span(item.channel, &item.id, worker.id());
        async {
            let reply = worker.process(&item).await;

            let payload = match serde_json::to_value(&reply) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(item_id = %item.id, "reply serialization failed: {e}");
                    return;
                }
            };

            // Publish first, then ack.
            loop {
                match self
                    .queue
                    .append(&self.config.result_stream, &payload)
                    .await
                {
                    Ok(_) => break,
                    Err(e) => {
                        if self.stopped.load(Ordering::Relaxed) {
                            warn!(item_id = %item.id, "shutdown before reply publish, delivery stays pending");
                            return;
                        }
                        warn!(item_id = %item.id, "reply publish failed: {e}, retrying");
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }

            if let Err(e) = self
                .queue
                .ack(&self.config.work_stream, &self.config.group, &delivery_id)
                .await
            {
                // At-least-once: the entry will be redelivered and produce
                // a second, orphaned reply.
                warn!(item_id = %item.id, "ack failed: {e}");
            }

            self.stats.record(&reply);
        }
        .instrument(span)
        .await
    }
}
