// src/state.rs

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    api::{ApiClient, InvalidationBus},
    attempt::{AttemptDeps, Clock, QuizApi, SystemClock},
    config::Config,
    error::AppError,
    session::SessionContext,
    store::{self, DeadlineStore, SqliteDeadlineStore},
};

/// Shared application state handed to every controller.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub session: SessionContext,
    pub api: ApiClient,
    pub bus: InvalidationBus,
    pub deadlines: Arc<dyn DeadlineStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Opens the local store, restores the session, purges stale attempt
    /// deadlines and builds the API client.
    pub async fn init(config: Config) -> Result<Self, AppError> {
        let pool = store::connect(&config).await?;
        Self::with_pool(config, pool, Arc::new(SystemClock)).await
    }

    pub async fn with_pool(
        config: Config,
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let session = SessionContext::restore(pool.clone()).await?;
        let bus = InvalidationBus::new();
        let api = ApiClient::new(&config, session.clone(), bus.clone())?;
        let deadlines: Arc<dyn DeadlineStore> = Arc::new(SqliteDeadlineStore::new(pool.clone()));

        store::purge_stale_deadlines(deadlines.as_ref(), config.attempt_ttl(), clock.now()).await?;

        Ok(Self {
            config,
            pool,
            session,
            api,
            bus,
            deadlines,
            clock,
        })
    }

    pub fn attempt_deps(&self) -> AttemptDeps {
        let api: Arc<dyn QuizApi> = Arc::new(self.api.clone());
        AttemptDeps {
            api,
            store: self.deadlines.clone(),
            session: self.session.clone(),
            clock: self.clock.clone(),
        }
    }
}
