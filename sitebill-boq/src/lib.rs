//! sitebill-boq library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod parser;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sitebill_common::events::ProgressBus;
use sqlx::SqlitePool;

use crate::services::{ActivityLogger, FileStorage, PhaseMaterializer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Per-session progress bus for SSE broadcasting
    pub progress: ProgressBus,
    /// Durable storage for uploaded BOQ files
    pub storage: FileStorage,
    /// Phase materialization service
    pub materializer: PhaseMaterializer,
    /// Fire-and-forget activity logger
    pub activity: ActivityLogger,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, storage: FileStorage, progress: ProgressBus) -> Self {
        let activity = ActivityLogger::new(db.clone());
        let materializer =
            PhaseMaterializer::new(db.clone(), storage.clone(), activity.clone());
        Self {
            db,
            progress,
            storage,
            materializer,
            activity,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::boq_routes())
        .merge(api::phase_routes())
        .route("/boq/progress/:session_id", get(api::progress_stream))
        .merge(api::health_routes())
        .with_state(state)
}
