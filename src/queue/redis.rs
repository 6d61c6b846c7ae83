//! Redis Streams implementation of [`MessageStream`].
//!
//! XADD / XREADGROUP / XACK / XLEN / XRANGE / XDEL via a shared
//! ConnectionManager. Payloads travel as JSON in a single `data` field.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamPendingReply, StreamRangeReply, StreamReadOptions, StreamReadReply};

use super::{MessageStream, StreamEntry};
use crate::error::{Error, Result};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Redis-backed [`MessageStream`].
pub struct RedisStream {
    conn: ConnectionManager,
}

impl RedisStream {
    /// Connect to Redis and build a managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn entries_from_read(reply: StreamReadReply) -> Result<Vec<StreamEntry>> {
    let mut entries = Vec::new();
    for key in reply.keys {
        for id in key.ids {
            if let Some(value) = id.map.get("data") {
                let raw: String = redis::from_redis_value(value)?;
                entries.push(StreamEntry {
                    id: id.id.clone(),
                    payload: serde_json::from_str(&raw)?,
                });
            }
        }
    }
    Ok(entries)
}

#[async_trait]
impl MessageStream for RedisStream {
    async fn append(&self, stream: &str, payload: &serde_json::Value) -> Result<String> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(payload)?;
        let id: String = conn.xadd(stream, "*", &[("data", raw.as_str())]).await?;
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
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => Ok(()),
            // Group already exists — initialization is idempotent.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();

        // Fresh entries first.
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_count)
            .block(block.as_millis() as usize);
        let reply: StreamReadReply = conn.xread_options(&[stream], &[">"], &options).await?;
        let mut entries = entries_from_read(reply)?;

        // Re-resolve this consumer's own pending entries on every pass, so
        // a delivery left unacked (no idle worker at the time) comes back
        // on the next pass instead of starving behind newer items. Entries
        // just delivered above are already pending too; skip those.
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_count);
        let reply: StreamReadReply = conn.xread_options(&[stream], &["0"], &options).await?;
        for entry in entries_from_read(reply)? {
            if !entries.iter().any(|e| e.id == entry.id) {
                entries.push(entry);
            }
        }

        if !entries.is_empty() {
            metrics::queue_operations().add(
                entries.len() as u64,
                &[
                    KeyValue::new("stream", stream.to_string()),
                    KeyValue::new("operation", "read"),
                ],
            );
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[entry_id]).await?;
        // Drop the entry so XLEN stays an honest backlog signal.
        let _: i64 = conn.xdel(stream, &[entry_id]).await?;
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
        let mut conn = self.conn.clone();
        let n: u64 = conn.xlen(stream).await?;
        Ok(n)
    }

    async fn read_all(&self, stream: &str) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn.xrange_all(stream).await?;
        let mut entries = Vec::new();
        for id in reply.ids {
            if let Some(value) = id.map.get("data") {
                let raw: String = redis::from_redis_value(value)?;
                entries.push(StreamEntry {
                    id: id.id.clone(),
                    payload: serde_json::from_str(&raw)?,
                });
            }
        }
        Ok(entries)
    }

    async fn delete(&self, stream: &str, entry_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xdel(stream, &[entry_id]).await?;
        Ok(())
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingReply = conn.xpending(stream, group).await?;
        Ok(reply.count() as u64)
    }
}
