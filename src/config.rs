// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Page size used by the subject browser on the home screen.
pub const HOME_PAGE_SIZE: u32 = 10;

/// Page size used by the per-subject quiz list.
pub const QUIZ_LIST_PAGE_SIZE: u32 = 8;

/// Page size used by the student's result history.
pub const HISTORY_PAGE_SIZE: u32 = 10;

/// Page size used by the client-side paged management tables.
pub const MANAGEMENT_PAGE_SIZE: usize = 10;

/// Scores at or above this value are reported as "high".
pub const HIGH_SCORE_THRESHOLD: f64 = 80.0;

/// Scores at or above this value (and below the high band) are "medium".
pub const MEDIUM_SCORE_THRESHOLD: f64 = 50.0;

/// Below this many seconds the countdown is rendered as a warning.
pub const LOW_TIME_WARNING_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the backend, e.g. `https://localhost:7107`.
    pub api_base_url: String,
    /// Path prefix of the OData endpoint, e.g. `/odata`.
    pub odata_prefix: String,
    /// SQLite connection string of the durable local store.
    pub store_url: String,
    pub rust_log: String,
    pub log_dir: String,
    pub request_timeout_secs: u64,
    /// Accept self-signed certificates (the development backend uses one).
    pub accept_invalid_certs: bool,
    pub tick_interval_ms: u64,
    /// Attempt deadlines older than this are purged at startup.
    pub attempt_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let api_base_url = env::var("API_BASE_URL")
            .unwrap_or_else(|_| "https://localhost:7107".to_string())
            .trim_end_matches('/')
            .to_string();

        let odata_prefix = env::var("ODATA_PREFIX").unwrap_or_else(|_| "/odata".to_string());

        let store_url = env::var("STORE_URL")
            .unwrap_or_else(|_| "sqlite://practice-quiz.db?mode=rwc".to_string());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        Self {
            api_base_url,
            odata_prefix,
            store_url,
            rust_log,
            log_dir,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            accept_invalid_certs: env_or("ACCEPT_INVALID_CERTS", false),
            tick_interval_ms: env_or("TICK_INTERVAL_MS", 1000),
            attempt_ttl_hours: env_or("ATTEMPT_TTL_HOURS", 24),
        }
    }

    /// Config pointing at `base_url`, everything else at its default.
    /// Used by tests that talk to a locally spawned backend.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            api_base_url: base_url.trim_end_matches('/').to_string(),
            odata_prefix: "/odata".to_string(),
            store_url: "sqlite::memory:".to_string(),
            rust_log: "error".to_string(),
            log_dir: "logs".to_string(),
            request_timeout_secs: 5,
            accept_invalid_certs: false,
            tick_interval_ms: 1000,
            attempt_ttl_hours: 24,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn attempt_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.attempt_ttl_hours.max(1))
    }
}

/// Reads and parses an optional variable, falling back to `default` when it is
/// missing or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let config = Config::for_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let mut config = Config::for_base_url("http://x");
        config.tick_interval_ms = 0;
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
