//! HTTP handlers for sensor ingestion

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use shared::{SensorEvent, SensorReading};

use crate::error::AppResult;
use crate::services::IngestOutcome;
use crate::AppState;

/// Accept one sensor event, the same way the broker path does
pub async fn push_sensor_event(
    State(state): State<AppState>,
    Json(event): Json<SensorEvent>,
) -> AppResult<(StatusCode, Json<IngestOutcome>)> {
    let outcome = state.ingest.ingest(event).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub len: usize,
    pub capacity: usize,
    pub ready_at: usize,
    pub ready: bool,
    pub readings: Vec<SensorReading>,
}

/// Buffered readings, oldest first
pub async fn get_window(State(state): State<AppState>) -> Json<WindowResponse> {
    let window = state.window.read();
    Json(WindowResponse {
        len: window.len(),
        capacity: window.capacity(),
        ready_at: window.ready_at(),
        ready: window.is_ready(),
        readings: window.snapshot(),
    })
}
