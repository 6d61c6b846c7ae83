//! Durable ordered message streams with grouped consumption.
//!
//! Two implementations of the same contract: [`RedisStream`] over Redis
//! Streams for production, [`MemoryStream`] for tests and single-process
//! deployments. The dispatcher consumes the work stream through a consumer
//! group (each entry delivered to exactly one group member, acked after its
//! reply is durably published); the facade reads the result stream whole,
//! with no group, because every waiting caller must see every reply once.

pub mod memory;
pub mod redis;

pub use memory::MemoryStream;
pub use redis::RedisStream;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One entry read from a stream.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Entry ID, `<epoch-millis>-<seq>`. Doubles as the delivery ID for
    /// acks and as an age signal for the result reaper.
    pub id: String,
    pub payload: serde_json::Value,
}

impl StreamEntry {
    /// Epoch milliseconds encoded in the entry ID, if well-formed.
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.id.split('-').next()?.parse().ok()
    }
}

/// An append-only log with grouped, ack-based consumption.
///
/// Delivery semantics are at-least-once: an entry delivered to a group
/// member stays pending until acked. The owning consumer sees its pending
/// entries again on every read; another consumer may claim them after a
/// long idle window. Exactly-once is a non-goal.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Append a payload to the stream tail. Returns the entry ID.
    ///
    /// Fails with [`Error::QueueUnavailable`](crate::error::Error) when the
    /// backing store is unreachable; never blocks indefinitely.
    async fn append(&self, stream: &str, payload: &serde_json::Value) -> Result<String>;

    /// Create a consumer group at the stream head. Idempotent: a group
    /// that already exists is not an error.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Deliver up to `max_count` undelivered entries to this consumer,
    /// marking them pending, plus redeliveries of this consumer's own
    /// pending entries. Blocks up to `block` when nothing fresh is
    /// available. This is the dispatcher's single suspension point.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;

    /// Mark a pending delivery complete and discard the entry. Idempotent:
    /// acking twice is a no-op.
    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<()>;

    /// Approximate count of entries still in the stream. Used only as a
    /// load signal; may be stale by design.
    async fn len(&self, stream: &str) -> Result<u64>;

    /// Read every entry in the stream, ignoring group state.
    async fn read_all(&self, stream: &str) -> Result<Vec<StreamEntry>>;

    /// Remove a single entry.
    async fn delete(&self, stream: &str, entry_id: &str) -> Result<()>;

    /// Count of delivered-but-unacked entries for a group.
    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64>;
}
