//! Shared test fixtures: canned reply generators and a short-interval
//! orchestrator over the in-memory stream.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_rs::dispatch::DispatchConfig;
use courier_rs::error::{Error, Result};
use courier_rs::llm::{GeneratedReply, HistoryEntry, ReplyGenerator};
use courier_rs::model::Channel;
use courier_rs::orchestrator::{Orchestrator, OrchestratorConfig};
use courier_rs::queue::MemoryStream;
use courier_rs::scale::ScaleConfig;
use tokio::sync::Semaphore;

/// Deterministic success: echoes the inbound content back.
pub struct EchoGenerator;

#[async_trait]
impl ReplyGenerator for EchoGenerator {
    async fn generate(
        &self,
        content: &str,
        _history: &[HistoryEntry],
        _channel: Channel,
    ) -> Result<GeneratedReply> {
        Ok(GeneratedReply {
            content: format!("Here's the solution: first check your settings. Regarding: {content}"),
            confidence_score: 0.9,
            should_escalate: false,
        })
    }
}

/// Always fails, exercising the degraded path.
pub struct FailingGenerator;

#[async_trait]
impl ReplyGenerator for FailingGenerator {
    async fn generate(
        &self,
        _content: &str,
        _history: &[HistoryEntry],
        _channel: Channel,
    ) -> Result<GeneratedReply> {
        Err(Error::Generation("model unavailable".to_string()))
    }
}

/// Blocks until a permit is released, then succeeds. Lets a test hold a
/// worker busy for as long as it needs.
pub struct GatedGenerator {
    gate: Arc<Semaphore>,
}

impl GatedGenerator {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

#[async_trait]
impl ReplyGenerator for GatedGenerator {
    async fn generate(
        &self,
        content: &str,
        _history: &[HistoryEntry],
        _channel: Channel,
    ) -> Result<GeneratedReply> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| Error::Generation("gate closed".to_string()))?;
        permit.forget();
        Ok(GeneratedReply {
            content: format!("Handled after the gate: {content}"),
            confidence_score: 0.9,
            should_escalate: false,
        })
    }
}

/// Orchestrator over the given stream with intervals tightened for tests.
pub fn test_orchestrator(
    queue: Arc<MemoryStream>,
    generator: Arc<dyn ReplyGenerator>,
    target_pool_size: usize,
    max_workers: usize,
) -> Orchestrator {
    let config = OrchestratorConfig {
        dispatch: DispatchConfig {
            poll_block: Duration::from_millis(50),
            retry_delay: Duration::from_millis(50),
            ..DispatchConfig::default()
        },
        scale: ScaleConfig {
            target_pool_size,
            interval: Duration::from_millis(100),
            retry_delay: Duration::from_millis(100),
            ..ScaleConfig::default()
        },
        max_workers,
        submit_poll_interval: Duration::from_millis(10),
        submit_timeout: Duration::from_secs(5),
    };
    Orchestrator::new(queue, generator, config)
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
