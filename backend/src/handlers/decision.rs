//! HTTP handlers for the irrigation policy and the live nowcast

use axum::{extract::State, Json};
use serde::Deserialize;
use shared::{Decision, ForecastResult};
use validator::Validate;

use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct DecisionRequest {
    #[validate(range(min = 0.0, max = 100.0))]
    pub soil_moisture: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub rain_probability: f64,
}

/// Evaluate the policy with the configured thresholds
pub async fn evaluate_decision(
    State(state): State<AppState>,
    Json(input): Json<DecisionRequest>,
) -> AppResult<Json<Decision>> {
    input.validate()?;
    let decision = state
        .engine
        .thresholds()
        .decide(input.soil_moisture, input.rain_probability);
    Ok(Json(decision))
}

/// Latest live nowcast, computed on demand when none ran yet
pub async fn get_nowcast(State(state): State<AppState>) -> AppResult<Json<ForecastResult>> {
    if let Some(latest) = state.nowcast.latest() {
        return Ok(Json(latest));
    }
    let result = state.engine.evaluate_latest().await?;
    Ok(Json(result))
}
