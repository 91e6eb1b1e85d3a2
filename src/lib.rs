pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use error::AppError;
use store::{DocumentStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub config: Arc<Config>,
}

/// Opens Postgres when `DATABASE_URL` is set, otherwise a fresh in-memory
/// store. With `persistent` the in-memory fallback is refused.
pub async fn open_store(config: &Config, persistent: bool) -> Result<DocumentStore, AppError> {
    match &config.database_url {
        Some(url) => Ok(DocumentStore::Postgres(PgStore::connect(url).await?)),
        None if persistent => Err(AppError::Internal(
            "DATABASE_URL must be set; the in-memory store holds no data to work on".into(),
        )),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data will not persist");
            Ok(DocumentStore::Memory(MemoryStore::new()))
        }
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "db": true }))),
        Err(e) => {
            tracing::error!("health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "db": false })),
            )
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(routes::api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
