pub mod auth;
pub mod papers;

pub use auth::auth_routes;
pub use papers::papers_routes;

use axum::{Json, http::StatusCode};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::ingest::Ingestor;
use crate::storage::PaperStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub ingestor: Ingestor,
    pub store: PaperStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            ingestor: Ingestor::new(pool.clone(), config.author_match_policy),
            store: PaperStore::new(config.upload_dir.clone()),
            config: Arc::new(config),
            pool,
        }
    }
}

pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn api_error(status: StatusCode, detail: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({"detail": detail.to_string()})))
}

pub fn internal_error<E: ToString>(error: E) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"detail": error.to_string()})),
    )
}
