//! Route definitions for the irrigation agent

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/schedule", schedule_routes())
        .route("/slots/:slot_id/skip", post(handlers::skip_slot))
        .nest("/sensor", sensor_routes())
        .route("/decision", post(handlers::evaluate_decision))
        .route("/nowcast", get(handlers::get_nowcast))
}

/// Schedule routes
fn schedule_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_schedule))
        .route("/regenerate", post(handlers::regenerate_schedule))
        .route("/due", get(handlers::get_due_slots))
        .route("/demo", post(handlers::rebase_for_demo))
}

/// Sensor routes
fn sensor_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::push_sensor_event))
        .route("/window", get(handlers::get_window))
}
