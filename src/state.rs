// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::buffer::{AnswerBuffer, InMemoryBuffer};
use crate::config::Config;
use crate::store::pg::{PgAttemptStore, PgExamCatalog};
use crate::store::{AttemptStore, ExamCatalog};

#[derive(Clone)]
pub struct AppState {
    pub attempts: Arc<dyn AttemptStore>,
    pub catalog: Arc<dyn ExamCatalog>,
    pub buffer: Arc<dyn AnswerBuffer>,
    pub config: Config,
}

impl AppState {
    /// Production wiring: Postgres for the durable stores, the in-process
    /// TTL map for the answer buffer.
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            attempts: Arc::new(PgAttemptStore::new(pool.clone())),
            catalog: Arc::new(PgExamCatalog::new(pool)),
            buffer: Arc::new(InMemoryBuffer::new()),
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
