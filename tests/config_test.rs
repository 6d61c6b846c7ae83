use courier_rs::config::Config;
use secrecy::ExposeSecret;

// One test so the env mutations cannot race each other.
#[test]
fn config_loads_from_env_and_fails_without_required_vars() {
    unsafe {
        std::env::set_var("REDIS_URL", "redis://localhost:6379");
        std::env::set_var("ANTHROPIC_API_KEY", "sk-test-key");
        std::env::remove_var("WORKER_POOL_SIZE");
        std::env::remove_var("MAX_CONCURRENT_WORKERS");
        std::env::remove_var("STREAM_BATCH_SIZE");
        std::env::remove_var("MAX_RESPONSE_TIME_MS");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.redis_url.expose_secret(), "redis://localhost:6379");
    assert!(!config.log_level.is_empty());
    assert_eq!(config.worker_pool_size, 50);
    assert_eq!(config.max_concurrent_workers, 1000);
    assert_eq!(config.stream_batch_size, 10);
    assert_eq!(config.max_response_time_ms, 5000);

    unsafe {
        std::env::set_var("WORKER_POOL_SIZE", "not-a-number");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("WORKER_POOL_SIZE");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("ANTHROPIC_API_KEY");
    }
    assert!(Config::from_env().is_err());
}
