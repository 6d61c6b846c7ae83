//! In-process stream implementation.
//!
//! Same observable contract as the Redis implementation, backed by a
//! mutex-guarded map of streams plus a Notify for blocking reads. Used by
//! tests and by single-process deployments that don't want a Redis
//! dependency.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{MessageStream, StreamEntry};
use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Claim window for pending entries owned by another consumer. The owning
/// consumer sees its own pending entries again on every read, mirroring an
/// XREADGROUP "0" pass.
const DEFAULT_REDELIVER_AFTER: Duration = Duration::from_secs(30);

struct PendingDelivery {
    consumer: String,
    delivered_at: Instant,
}

#[derive(Default)]
struct GroupState {
    /// Entry ID -> owning consumer and last delivery time. Removed on ack.
    pending: HashMap<String, PendingDelivery>,
}

#[derive(Default)]
struct StreamState {
    next_seq: u64,
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupState>,
}

/// In-memory [`MessageStream`].
pub struct MemoryStream {
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
    redeliver_after: Duration,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::with_redeliver_after(DEFAULT_REDELIVER_AFTER)
    }

    /// Override the cross-consumer claim window. Tests use short windows to
    /// exercise the claim path quickly.
    pub fn with_redeliver_after(redeliver_after: Duration) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
            redeliver_after,
        }
    }

    /// One non-blocking delivery attempt over undelivered entries.
    async fn deliver_fresh(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Vec<StreamEntry> {
        let mut streams = self.streams.lock().await;
        let state = match streams.get_mut(stream) {
            Some(s) => s,
            None => return Vec::new(),
        };
        let group_state = state.groups.entry(group.to_string()).or_default();

        let now = Instant::now();
        let mut batch = Vec::new();
        for entry in &state.entries {
            if batch.len() >= max_count {
                break;
            }
            if !group_state.pending.contains_key(&entry.id) {
                batch.push(entry.clone());
            }
        }
        for entry in &batch {
            group_state.pending.insert(
                entry.id.clone(),
                PendingDelivery {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
        }
        batch
    }

    /// Re-resolve pending entries for this consumer: its own on every pass,
    /// another consumer's only once their last delivery is older than the
    /// claim window.
    async fn redeliver_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Vec<StreamEntry> {
        let mut streams = self.streams.lock().await;
        let state = match streams.get_mut(stream) {
            Some(s) => s,
            None => return Vec::new(),
        };
        let group_state = state.groups.entry(group.to_string()).or_default();

        let now = Instant::now();
        let mut batch = Vec::new();
        for entry in &state.entries {
            if batch.len() >= max_count {
                break;
            }
            if let Some(delivery) = group_state.pending.get(&entry.id)
                && (delivery.consumer == consumer
                    || now.duration_since(delivery.delivered_at) >= self.redeliver_after)
            {
                batch.push(entry.clone());
            }
        }
        for entry in &batch {
            group_state.pending.insert(
                entry.id.clone(),
                PendingDelivery {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                },
            );
        }
        batch
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn append(&self, stream: &str, payload: &serde_json::Value) -> Result<String> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        let id = format!("{}-{}", chrono::Utc::now().timestamp_millis(), state.next_seq);
        state.next_seq += 1;
        state.entries.push(StreamEntry {
            id: id.clone(),
            payload: payload.clone(),
        });
        drop(streams);

        self.appended.notify_waiters();
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("stream", stream.to_string()),
                KeyValue::new("operation", "append"),
            ],
        );
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        let mut batch = loop {
            // Register for wakeup before checking state, so an append
            // between the check and the await is not missed.
            let appended = self.appended.notified();

            let fresh = self
                .deliver_fresh(stream, group, consumer, max_count)
                .await;
            if !fresh.is_empty() {
                break fresh;
            }
            if Instant::now() >= deadline {
                break Vec::new();
            }
            tokio::select! {
                _ = appended => {}
                _ = tokio::time::sleep_until(deadline) => break Vec::new(),
            }
        };

        // An entry skipped on an earlier pass (no idle worker at the time)
        // comes back on the very next pass, not after the claim window.
        for entry in self
            .redeliver_pending(stream, group, consumer, max_count)
            .await
        {
            if !batch.iter().any(|e| e.id == entry.id) {
                batch.push(entry);
            }
        }

        if !batch.is_empty() {
            metrics::queue_operations().add(
                batch.len() as u64,
                &[
                    KeyValue::new("stream", stream.to_string()),
                    KeyValue::new("operation", "read"),
                ],
            );
        }
        Ok(batch)
    }

    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        if let Some(state) = streams.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(entry_id);
            }
            // Acked entries leave the log: the stream length stays an
            // honest backlog signal.
            state.entries.retain(|e| e.id != entry_id);
        }
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("stream", stream.to_string()),
                KeyValue::new("operation", "ack"),
            ],
        );
        Ok(())
    }

    async fn len(&self, stream: &str) -> Result<u64> {
        let streams = self.streams.lock().await;
        Ok(streams
            .get(stream)
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn read_all(&self, stream: &str) -> Result<Vec<StreamEntry>> {
        let streams = self.streams.lock().await;
        Ok(streams
            .get(stream)
            .map(|s| s.entries.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, stream: &str, entry_id: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        if let Some(state) = streams.get_mut(stream) {
            state.entries.retain(|e| e.id != entry_id);
            for group_state in state.groups.values_mut() {
                group_state.pending.remove(entry_id);
            }
        }
        Ok(())
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64> {
        let streams = self.streams.lock().await;
        Ok(streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len() as u64)
            .unwrap_or(0))
    }
}
