// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,

    /// How often the auto-submit sweeper polls for overdue attempts, seconds.
    pub sweep_interval_secs: u64,
    /// Max overdue attempts finalized per sweep cycle.
    pub sweep_batch_size: i64,

    /// Buffer TTL for attempts without a deadline, minutes.
    pub buffer_default_ttl_minutes: i64,
    /// Grace period the buffer outlives the exam deadline by, minutes.
    /// Clients may override per save, capped by `buffer_grace_cap_minutes`.
    pub buffer_grace_minutes: i64,
    pub buffer_grace_cap_minutes: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let sweep_interval_secs = env_parse("SWEEP_INTERVAL_SECS", 30);
        let sweep_batch_size = env_parse("SWEEP_BATCH_SIZE", 100);
        let buffer_default_ttl_minutes = env_parse("BUFFER_DEFAULT_TTL_MINUTES", 180);
        let buffer_grace_minutes = env_parse("BUFFER_GRACE_MINUTES", 10);
        let buffer_grace_cap_minutes = env_parse("BUFFER_GRACE_CAP_MINUTES", 24 * 60);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            sweep_interval_secs,
            sweep_batch_size,
            buffer_default_ttl_minutes,
            buffer_grace_minutes,
            buffer_grace_cap_minutes,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
