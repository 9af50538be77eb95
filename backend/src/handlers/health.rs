//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub model: String,
    pub schedule_loaded: bool,
    pub schedule_dirty: bool,
    pub window_len: usize,
    pub window_ready: bool,
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (window_len, window_ready) = {
        let window = state.window.read();
        (window.len(), window.is_ready())
    };
    let schedule_state = state.schedules.state();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        model: state.engine.model_name().to_string(),
        schedule_loaded: schedule_state.current().is_some(),
        schedule_dirty: schedule_state.is_dirty(),
        window_len,
        window_ready,
    })
}
