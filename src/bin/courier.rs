//! courier CLI — operator interface to the reply orchestration core.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_rs::config::Config;
use courier_rs::llm::RigGenerator;
use courier_rs::model::{Channel, NewWorkItem};
use courier_rs::orchestrator::{Orchestrator, OrchestratorConfig};
use courier_rs::queue::RedisStream;
use courier_rs::scale::ScaleConfig;
use courier_rs::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use tracing::info;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Orphaned replies older than this are reaped during serve.
const REAP_AGE: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "courier", about = "Reply orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator daemon against Redis
    Serve {
        /// Completion model for reply generation
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
    /// Submit one message and wait for its reply
    Submit {
        /// Message text
        content: String,
        /// Conversation the message belongs to
        #[arg(long, default_value = "cli")]
        conversation: String,
        /// Channel: chat, email or voice
        #[arg(long, default_value = "chat")]
        channel: String,
        /// Wait deadline in milliseconds (default from MAX_RESPONSE_TIME_MS)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Completion model for reply generation
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { model } => cmd_serve(model).await,
        Command::Submit {
            content,
            conversation,
            channel,
            timeout_ms,
            model,
        } => cmd_submit(content, conversation, channel, timeout_ms, model).await,
    }
}

async fn build_orchestrator(config: &Config, model: &str) -> anyhow::Result<Orchestrator> {
    let queue = Arc::new(RedisStream::connect(config.redis_url.expose_secret()).await?);
    let generator = Arc::new(RigGenerator::new(&config.anthropic_api_key, model)?);

    let mut orch_config = OrchestratorConfig {
        max_workers: config.max_concurrent_workers,
        submit_timeout: Duration::from_millis(config.max_response_time_ms),
        scale: ScaleConfig {
            target_pool_size: config.worker_pool_size,
            ..ScaleConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    orch_config.dispatch.batch_size = config.stream_batch_size;

    Ok(Orchestrator::new(queue, generator, orch_config))
}

async fn cmd_serve(model: String) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "courier".to_string(),
    })?;

    let orchestrator = Arc::new(build_orchestrator(&config, &model).await?);
    orchestrator.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut report = tokio::time::interval(Duration::from_secs(30));
    report.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => {
                let pool = orchestrator.pool_status();
                let stats = orchestrator.throughput_stats();
                let depth = orchestrator.queue_depth().await.unwrap_or(0);
                info!(
                    workers = pool.count,
                    idle = pool.idle,
                    busy = pool.busy,
                    backlog = depth,
                    processed = stats.processed,
                    escalated = stats.escalated,
                    "status"
                );
                let _ = orchestrator.reap_stale_results(REAP_AGE).await;
            }
        }
    }

    orchestrator.stop().await;
    Ok(())
}

async fn cmd_submit(
    content: String,
    conversation: String,
    channel: String,
    timeout_ms: Option<u64>,
    model: String,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let channel: Channel = channel
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid channel: {channel}"))?;
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(config.max_response_time_ms));

    let orchestrator = build_orchestrator(&config, &model).await?;
    orchestrator.start();

    let reply = orchestrator
        .submit(
            NewWorkItem::new(&conversation, &content).channel(channel),
            timeout,
        )
        .await;

    orchestrator.stop().await;

    let reply = reply?;
    println!("{}", reply.content);
    println!("---");
    println!("Confidence: {:.2}", reply.confidence_score);
    println!("Escalated:  {}", reply.escalated);
    println!("Worker:     {}", reply.worker_id);
    println!("Duration:   {}ms", reply.processing_time_ms);
    if let Some(ref err) = reply.error {
        println!("Error:      {err}");
    }
    Ok(())
}
