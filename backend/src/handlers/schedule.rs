//! HTTP handlers for the irrigation schedule

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{parse_utc, Schedule, Slot, SlotId};

use crate::error::{AppError, AppResult};
use crate::services::trigger::DueSlot;
use crate::AppState;

/// Current schedule
pub async fn get_schedule(State(state): State<AppState>) -> AppResult<Json<Schedule>> {
    let schedule = state.schedules.current()?;
    Ok(Json(Schedule::clone(&schedule)))
}

/// Build a new plan now
pub async fn regenerate_schedule(State(state): State<AppState>) -> AppResult<Json<Schedule>> {
    let schedule = state.schedules.regenerate().await?;
    Ok(Json(Schedule::clone(&schedule)))
}

#[derive(Debug, Serialize)]
pub struct DueSlotsResponse {
    pub lookahead_minutes: f64,
    pub grace_minutes: f64,
    pub find_next: bool,
    pub slots: Vec<DueSlot>,
}

/// Slots the next trigger scan would check
pub async fn get_due_slots(State(state): State<AppState>) -> AppResult<Json<DueSlotsResponse>> {
    let config = state.trigger.config();
    Ok(Json(DueSlotsResponse {
        lookahead_minutes: config.lookahead_minutes,
        grace_minutes: config.grace_minutes,
        find_next: config.find_next,
        slots: state.trigger.preview()?,
    }))
}

/// Operator override: skip a pending slot
pub async fn skip_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<String>,
) -> AppResult<Json<Slot>> {
    let id = SlotId::parse(&slot_id).ok_or_else(|| AppError::Validation {
        field: "slot_id".to_string(),
        message: format!("'{}' is not a slot start time", slot_id),
        message_vi: format!("'{}' không phải thời điểm bắt đầu hợp lệ", slot_id),
    })?;
    let slot = state.schedules.skip_slot(&id).await?;
    Ok(Json(slot))
}

#[derive(Debug, Deserialize)]
pub struct DemoQuery {
    /// Demo time; defaults to now
    pub at: Option<String>,
}

/// Shift the current schedule onto the demo date
pub async fn rebase_for_demo(
    State(state): State<AppState>,
    Query(query): Query<DemoQuery>,
) -> AppResult<Json<Schedule>> {
    let demo_at: Option<DateTime<Utc>> = match query.at.as_deref() {
        Some(raw) => Some(parse_utc(raw).ok_or_else(|| AppError::Validation {
            field: "at".to_string(),
            message: format!("'{}' is not an ISO-8601 time", raw),
            message_vi: format!("'{}' không phải thời gian ISO-8601", raw),
        })?),
        None => None,
    };
    let schedule = state.schedules.rebase_for_demo(demo_at).await?;
    Ok(Json(Schedule::clone(&schedule)))
}
