//! # courier-rs
//!
//! Reply orchestration core for customer communications.
//!
//! Routes inbound messages (chat, email, voice transcripts) through a
//! durable, at-least-once work stream to an autoscaled pool of workers
//! that call an external reply-generation capability (rig-core), and
//! correlates each reply back to its synchronous submitter with a
//! bounded timeout.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod scale;
pub mod telemetry;
pub mod worker;
