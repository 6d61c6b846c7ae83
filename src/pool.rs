//! The set of live workers.
//!
//! The pool owns its workers behind a single mutex: the dispatcher scans
//! for an idle worker while the autoscaler grows or shrinks the set, and
//! the one guard is what keeps scale-down-while-assigning sound. Worker
//! order is insertion order; shrink removes from the front.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::llm::ReplyGenerator;
use crate::model::{ItemId, PoolStatus, WorkerSnapshot, WorkerStatus};
use crate::telemetry::metrics;
use crate::worker::Worker;
use opentelemetry::KeyValue;

pub struct WorkerPool {
    workers: Mutex<Vec<Arc<Worker>>>,
    generator: Arc<dyn ReplyGenerator>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(generator: Arc<dyn ReplyGenerator>, max_workers: usize) -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            generator,
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn len(&self) -> usize {
        self.workers.lock().expect("pool poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scale toward `target`, clamped to `[1, max_workers]`.
    ///
    /// Growth adds fresh idle workers. Shrink removes non-busy workers
    /// from the front of insertion order and never interrupts a busy one,
    /// so the pool can legitimately end up larger than the target.
    /// Returns the resulting size.
    pub fn scale_to(&self, target: usize) -> usize {
        let target = target.clamp(1, self.max_workers);
        let mut workers = self.workers.lock().expect("pool poisoned");
        let before = workers.len();

        if target > before {
            for _ in 0..(target - before) {
                let worker = Arc::new(Worker::new(Arc::clone(&self.generator)));
                info!(worker_id = %worker.id(), "worker added");
                workers.push(worker);
            }
        } else if target < before {
            let mut to_remove = before - target;
            workers.retain(|w| {
                if to_remove > 0 && w.status() != WorkerStatus::Busy {
                    info!(worker_id = %w.id(), "worker removed");
                    to_remove -= 1;
                    false
                } else {
                    true
                }
            });
        }

        let after = workers.len();
        if after != before {
            metrics::pool_size_changes().add(
                1,
                &[KeyValue::new(
                    "direction",
                    if after > before { "up" } else { "down" },
                )],
            );
            info!(from = before, to = after, target, "pool scaled");
        }
        after
    }

    /// Find an idle worker and assign it the item in one step, under the
    /// pool guard. Returns None when every worker is busy — the caller
    /// leaves the delivery pending for a later pass.
    pub fn acquire_idle(&self, item_id: ItemId) -> Option<Arc<Worker>> {
        let workers = self.workers.lock().expect("pool poisoned");
        workers
            .iter()
            .find(|w| w.try_assign(item_id))
            .map(Arc::clone)
    }

    pub fn status(&self) -> PoolStatus {
        let workers = self.workers.lock().expect("pool poisoned");
        let mut status = PoolStatus {
            count: workers.len(),
            idle: 0,
            busy: 0,
            error: 0,
        };
        for worker in workers.iter() {
            match worker.status() {
                WorkerStatus::Idle => status.idle += 1,
                WorkerStatus::Busy => status.busy += 1,
                WorkerStatus::Error => status.error += 1,
            }
        }
        status
    }

    pub fn snapshots(&self) -> Vec<WorkerSnapshot> {
        let workers = self.workers.lock().expect("pool poisoned");
        workers.iter().map(|w| w.snapshot()).collect()
    }
}
