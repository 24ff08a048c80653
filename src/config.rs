//! Process configuration, read from the environment (and `.env`) at startup.

use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket listener binds, `MURMUR_BIND`.
    pub bind_address: String,
    /// sqlx SQLite URL, `DATABASE_URL`.
    pub database_url: String,
    pub db_max_connections: u32,
    /// `tracing` filter directive, e.g. `"info"` or `"murmur=debug,tower_http=warn"`.
    pub log_level: String,
    pub log_json: bool,
    /// Session expiry on inactivity.
    pub session_minutes: i64,
    /// Per-connection queue of realtime events awaiting the socket writer.
    pub outbound_buffer: usize,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        // a missing .env file is fine
        let _ = dotenv::dotenv();

        Self {
            bind_address: env_or("MURMUR_BIND", "0.0.0.0:8080"),
            database_url: env_or("DATABASE_URL", "sqlite://murmur.db?mode=rwc"),
            db_max_connections: parse_env("MURMUR_DB_MAX_CONNECTIONS", 16),
            log_level: env_or("MURMUR_LOG", "info"),
            log_json: dotenv::var("MURMUR_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            session_minutes: parse_env("MURMUR_SESSION_MINUTES", 60),
            outbound_buffer: parse_env("MURMUR_OUTBOUND_BUFFER", 64),
            retry: RetryPolicy {
                attempts: parse_env("MURMUR_RETRY_ATTEMPTS", 3),
                base_delay: Duration::from_millis(parse_env("MURMUR_RETRY_BASE_MS", 25)),
                max_delay: Duration::from_millis(parse_env("MURMUR_RETRY_MAX_MS", 500)),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
