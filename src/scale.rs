//! Autoscaling control loop.
//!
//! Hysteresis policy: scale up aggressively (proportional to backlog),
//! scale down one worker per tick, so bursty load doesn't thrash the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::Result;
use crate::pool::WorkerPool;
use crate::queue::MessageStream;

/// Configuration for the autoscaler.
#[derive(Debug, Clone)]
pub struct ScaleConfig {
    pub work_stream: String,
    /// Pool size to drain back toward when the backlog is empty.
    pub target_pool_size: usize,
    /// Tick interval.
    pub interval: Duration,
    /// Shorter sleep after a failed tick.
    pub retry_delay: Duration,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            work_stream: "work_items".to_string(),
            target_pool_size: 50,
            interval: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Pure scaling policy.
///
/// Up when the backlog exceeds twice the pool: add `max(1, backlog / 10)`
/// workers, capped at `max_workers`. Down one step when the backlog is
/// empty and the pool sits above `target_pool_size`. Otherwise hold. The
/// result is always within `[1, max_workers]`.
pub fn desired_workers(
    backlog: u64,
    current: usize,
    target_pool_size: usize,
    max_workers: usize,
) -> usize {
    let desired = if backlog > current as u64 * 2 {
        let step = ((backlog / 10) as usize).max(1);
        (current + step).min(max_workers)
    } else if backlog == 0 && current > target_pool_size {
        (current - 1).max(target_pool_size)
    } else {
        current
    };
    desired.clamp(1, max_workers)
}

/// Periodic loop adjusting the pool toward the policy's target.
pub struct Autoscaler {
    queue: Arc<dyn MessageStream>,
    pool: Arc<WorkerPool>,
    config: ScaleConfig,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl Autoscaler {
    pub fn new(queue: Arc<dyn MessageStream>, pool: Arc<WorkerPool>, config: ScaleConfig) -> Self {
        Self {
            queue,
            pool,
            config,
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.shutdown.notify_waiters();
    }

    /// Run until shutdown. A failed tick (queue unreachable) is logged and
    /// retried after a shorter delay.
    pub async fn run(&self) -> Result<()> {
        info!(
            target = self.config.target_pool_size,
            max = self.pool.max_workers(),
            "autoscaler started"
        );
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                info!("autoscaler shutting down");
                return Ok(());
            }
            let delay = match self.tick().await {
                Ok(()) => self.config.interval,
                Err(e) => {
                    warn!("autoscale tick failed: {e}");
                    self.config.retry_delay
                }
            };
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("autoscaler shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One scaling decision: read the backlog, apply the policy, scale.
    pub async fn tick(&self) -> Result<()> {
        let backlog = self.queue.len(&self.config.work_stream).await?;
        let current = self.pool.len();
        let desired = desired_workers(
            backlog,
            current,
            self.config.target_pool_size,
            self.pool.max_workers(),
        );
        if desired != current {
            info!(backlog, current, desired, "scaling pool");
            self.pool.scale_to(desired);
        }
        Ok(())
    }
}
