//! One concurrent processing slot.
//!
//! A worker is assigned at most one work item at a time. Assignment is a
//! compare-and-set (`try_assign`) so two dispatch batches can never hand
//! the same worker two items. Failures of the reply-generation capability
//! never leave the worker: they become degraded, escalated replies.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::ReplyGenerator;
use crate::model::{ItemId, Reply, WorkItem, WorkerSnapshot, WorkerStatus};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Fixed reply content for the degraded path.
pub const FALLBACK_REPLY: &str = "I apologize, but I'm experiencing technical \
    difficulties. Let me connect you with a human agent who can assist you better.";

struct WorkerState {
    status: WorkerStatus,
    current_item_id: Option<ItemId>,
    processed_count: u64,
    error_count: u64,
    last_activity_at: DateTime<Utc>,
}

/// A stateful processing slot owned by the pool.
///
/// All interior state sits behind one mutex so the status/current-item
/// pair changes atomically: there is no observable instant where the
/// worker is busy without an item, or holds an item while idle.
pub struct Worker {
    id: String,
    generator: Arc<dyn ReplyGenerator>,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(generator: Arc<dyn ReplyGenerator>) -> Self {
        Self {
            id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            generator,
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Idle,
                current_item_id: None,
                processed_count: 0,
                error_count: 0,
                last_activity_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Compare-and-set from idle to busy. Returns false if the worker is
    /// already processing. A worker in error state accepts the item and
    /// recovers.
    pub fn try_assign(&self, item_id: ItemId) -> bool {
        let mut state = self.state.lock().expect("worker state poisoned");
        if state.status == WorkerStatus::Busy {
            return false;
        }
        state.status = WorkerStatus::Busy;
        state.current_item_id = Some(item_id);
        true
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().expect("worker state poisoned").status
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.state.lock().expect("worker state poisoned");
        WorkerSnapshot {
            id: self.id.clone(),
            status: state.status,
            current_item_id: state.current_item_id,
            processed_count: state.processed_count,
            error_count: state.error_count,
            last_activity_at: state.last_activity_at,
        }
    }

    /// Process an assigned item. Requires a prior successful
    /// [`try_assign`](Self::try_assign) for this item.
    ///
    /// Never fails: when the generation capability errors, the worker
    /// returns the degraded reply (apology content, confidence 0.0,
    /// escalated, error populated) and only its own error count grows.
    pub async fn process(&self, item: &WorkItem) -> Reply {
        debug_assert_eq!(
            self.state
                .lock()
                .expect("worker state poisoned")
                .current_item_id,
            Some(item.id),
            "process called without assignment"
        );

        let start = Instant::now();
        let generated = self
            .generator
            .generate(&item.content, &[], item.channel)
            .await;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        let (reply, failed) = match generated {
            Ok(generated) => {
                info!(
                    worker_id = %self.id,
                    item_id = %item.id,
                    processing_time_ms,
                    escalated = generated.should_escalate,
                    "item processed"
                );
                (
                    Reply {
                        item_id: item.id,
                        conversation_id: item.conversation_id.clone(),
                        content: generated.content,
                        confidence_score: generated.confidence_score,
                        escalated: generated.should_escalate,
                        worker_id: self.id.clone(),
                        processing_time_ms,
                        error: None,
                    },
                    false,
                )
            }
            Err(e) => {
                warn!(
                    worker_id = %self.id,
                    item_id = %item.id,
                    error = %e,
                    "generation failed, returning degraded reply"
                );
                (
                    Reply {
                        item_id: item.id,
                        conversation_id: item.conversation_id.clone(),
                        content: FALLBACK_REPLY.to_string(),
                        confidence_score: 0.0,
                        escalated: true,
                        worker_id: self.id.clone(),
                        processing_time_ms,
                        error: Some(e.to_string()),
                    },
                    true,
                )
            }
        };

        {
            let mut state = self.state.lock().expect("worker state poisoned");
            state.current_item_id = None;
            state.last_activity_at = Utc::now();
            if failed {
                state.status = WorkerStatus::Error;
                state.error_count += 1;
            } else {
                state.status = WorkerStatus::Idle;
            }
            state.processed_count += 1;
        }

        metrics::replies_produced().add(
            1,
            &[
                KeyValue::new("channel", item.channel.to_string()),
                KeyValue::new("escalated", reply.escalated.to_string()),
            ],
        );
        metrics::processing_duration_ms().record(
            processing_time_ms as f64,
            &[KeyValue::new("channel", item.channel.to_string())],
        );

        reply
    }
}
