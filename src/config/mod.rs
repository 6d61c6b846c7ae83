//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub redis_url: SecretString,
    pub anthropic_api_key: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Pool size the autoscaler drains back toward when the backlog is empty.
    pub worker_pool_size: usize,
    /// Hard ceiling on pool size, scale-up never exceeds it.
    pub max_concurrent_workers: usize,
    /// Max entries per dispatcher read from the work stream.
    pub stream_batch_size: usize,
    /// Default submit/await deadline.
    pub max_response_time_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: SecretString::from(required_var("REDIS_URL")?),
            anthropic_api_key: SecretString::from(required_var("ANTHROPIC_API_KEY")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            worker_pool_size: numeric_var("WORKER_POOL_SIZE", 50)?,
            max_concurrent_workers: numeric_var("MAX_CONCURRENT_WORKERS", 1000)?,
            stream_batch_size: numeric_var("STREAM_BATCH_SIZE", 10)?,
            max_response_time_ms: numeric_var("MAX_RESPONSE_TIME_MS", 5000)?,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn numeric_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}
