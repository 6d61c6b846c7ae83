//! Error types for courier-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The queue backing store could not be reached or refused the
    /// operation. Transient: the dispatcher and autoscaler loops log it
    /// and retry; it is never surfaced to submit callers mid-wait.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// No matching reply appeared within the caller's deadline. The work
    /// item may still complete later; its orphaned reply stays in the
    /// result stream until reaped.
    #[error("no reply within {waited_ms}ms")]
    ProcessingTimeout { waited_ms: u64 },

    /// The reply-generation capability failed. Workers convert this into
    /// a degraded, escalated reply; it never crosses the dispatcher.
    #[error("reply generation failed: {0}")]
    Generation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::QueueUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
