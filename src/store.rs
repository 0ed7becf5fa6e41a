// src/store.rs

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{config::Config, error::AppError};

/// Opens the local SQLite store and applies pending migrations.
///
/// In-memory databases live as long as their connection, so they get a
/// single connection that is never recycled.
pub async fn connect(config: &Config) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(&config.store_url)?.create_if_missing(true);
    let in_memory = config.store_url.contains(":memory:");

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?
    };

    tracing::info!("Local store opened: {}", config.store_url);

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Local store migrations applied.");

    Ok(pool)
}

/// Keyed store `{quiz id -> attempt start}` backing the countdown.
#[async_trait]
pub trait DeadlineStore: Send + Sync {
    /// Records `started_at` unless an entry already exists. Returns the start
    /// time that is in effect afterwards (the first write wins).
    async fn put(&self, quiz_id: i64, started_at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError>;

    async fn get(&self, quiz_id: i64) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, quiz_id: i64) -> Result<bool, AppError>;

    /// Removes entries that started before `cutoff`. Returns how many.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

#[derive(Debug, Clone)]
pub struct SqliteDeadlineStore {
    pool: SqlitePool,
}

impl SqliteDeadlineStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Storage(format!("Corrupt attempt timestamp: {}", ms)))
}

#[async_trait]
impl DeadlineStore for SqliteDeadlineStore {
    async fn put(&self, quiz_id: i64, started_at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        sqlx::query(
            "INSERT OR IGNORE INTO attempt_deadlines (quiz_id, started_at_ms) VALUES (?, ?)",
        )
        .bind(quiz_id)
        .bind(started_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let effective = self.get(quiz_id).await?;
        effective.ok_or_else(|| {
            AppError::Storage(format!("Attempt start for quiz {} was not stored", quiz_id))
        })
    }

    async fn get(&self, quiz_id: i64) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT started_at_ms FROM attempt_deadlines WHERE quiz_id = ?")
                .bind(quiz_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(ms,)| from_millis(ms)).transpose()
    }

    async fn delete(&self, quiz_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attempt_deadlines WHERE quiz_id = ?")
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM attempt_deadlines WHERE started_at_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Startup cleanup of abandoned attempts.
pub async fn purge_stale_deadlines(
    store: &dyn DeadlineStore,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let purged = store.purge_older_than(now - ttl).await?;
    if purged > 0 {
        tracing::info!("Purged {} stale attempt deadline(s)", purged);
    }
    Ok(purged)
}
