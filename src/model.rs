//! Core data model.
//!
//! A work item is one inbound customer message awaiting a generated reply.
//! It has identity (the correlation token the submitter waits on), the
//! conversation it belongs to, the channel it arrived on, and an open-ended
//! string-to-string side channel for channel-specific extras.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One inbound message to be answered. Immutable once created: consumed by
/// exactly one worker per successful dispatch, discarded after ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique correlation token. The submitter blocks on this.
    pub id: ItemId,

    /// Conversation this message belongs to.
    pub conversation_id: String,

    /// Text payload (chat message, email body, voice transcript).
    pub content: String,

    /// Channel the message arrived on.
    pub channel: Channel,

    pub created_at: DateTime<Utc>,

    /// Channel-specific extras. The core does not interpret these.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Where an inbound message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Chat,
    Email,
    Voice,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Chat => "chat",
            Channel::Email => "email",
            Channel::Voice => "voice",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Channel::Chat),
            "email" => Ok(Channel::Email),
            "voice" => Ok(Channel::Voice),
            other => Err(crate::error::Error::Other(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// The generated reply for one work item. Produced by exactly one worker,
/// written once to the result stream, consumed once by the awaiting caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// ID of the originating work item — the correlation tag.
    pub item_id: ItemId,

    pub conversation_id: String,

    /// Generated reply text, or the fixed apology on the degraded path.
    pub content: String,

    /// 0.0–1.0. A degraded reply always carries 0.0.
    pub confidence_score: f64,

    /// Whether this reply needs human handling instead of counting as
    /// resolved.
    pub escalated: bool,

    /// Worker that produced this reply.
    pub worker_id: String,

    pub processing_time_ms: u64,

    /// Populated on the degraded path; None on success.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Worker status
// ---------------------------------------------------------------------------

/// Observable state of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    /// Processing an item. Busy if and only if a current item ID is set.
    Busy,
    /// Last item hit the degraded path. Cleared when the worker accepts
    /// its next item.
    Error,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a worker, for the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub status: WorkerStatus,
    pub current_item_id: Option<ItemId>,
    /// Items this worker has finished, degraded replies included.
    pub processed_count: u64,
    pub error_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

/// Aggregate pool counts, for the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub count: usize,
    pub idle: usize,
    pub busy: usize,
    pub error: usize,
}

/// Cumulative throughput since start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub processed: u64,
    pub escalated: u64,
    pub avg_latency_ms: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for work items. The facade's public API for submitting messages.
pub struct NewWorkItem {
    conversation_id: String,
    content: String,
    channel: Channel,
    metadata: HashMap<String, String>,
}

impl NewWorkItem {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            channel: Channel::Chat,
            metadata: HashMap::new(),
        }
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finalize: allocate the correlation ID and timestamp.
    pub fn build(self) -> WorkItem {
        WorkItem {
            id: ItemId::new(),
            conversation_id: self.conversation_id,
            content: self.content,
            channel: self.channel,
            created_at: Utc::now(),
            metadata: self.metadata,
        }
    }
}
