//! Rain-aware irrigation agent
//!
//! Buffers live sensor readings, predicts rain for the next hour, builds a
//! seasonal 7-day irrigation plan and confirms or postpones each planned
//! slot shortly before it starts.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod routes;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::{
    DecisionEngine, IngestService, NowcastService, ScheduleService, SharedWindow, TriggerScheduler,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub window: SharedWindow,
    pub engine: Arc<DecisionEngine>,
    pub nowcast: Arc<NowcastService>,
    pub ingest: Arc<IngestService>,
    pub schedules: Arc<ScheduleService>,
    pub trigger: Arc<TriggerScheduler>,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Irrigation Agent API v1"
}
