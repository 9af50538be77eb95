//! Slot trigger scheduler
//!
//! Each scan picks the pending slots whose trigger time is near, runs the
//! forecast check as of that trigger time and commits the outcome:
//! `pending -> confirmed` when irrigation goes ahead, `pending -> postponed`
//! when rain makes it unnecessary. A check that fails for any reason
//! confirms the slot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use shared::{apply_forecast_result, DecisionEvent, ForecastResult, Schedule, SlotId, SlotStatus};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::external::Publisher;
use crate::services::clock::Clock;
use crate::services::decision_engine::DecisionEngine;
use crate::services::schedule_state::ScheduleState;

/// Lead assumed for slots saved without a trigger time by schedules that
/// did not record one either
const FALLBACK_LEAD_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DueReason {
    /// Trigger time inside the check window
    InWindow,
    /// Nothing in the window; nearest upcoming slot
    NextUp,
}

/// A slot selected for checking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueSlot {
    pub slot_id: SlotId,
    #[serde(with = "shared::utc_z")]
    pub start_ts: DateTime<Utc>,
    #[serde(with = "shared::utc_z")]
    pub trigger_at: DateTime<Utc>,
    pub minutes_until_trigger: f64,
    pub reason: DueReason,
}

/// Lead time recorded with the schedule
pub fn schedule_lead(schedule: &Schedule) -> Duration {
    if schedule.meta.lead_minutes > 0 {
        Duration::minutes(schedule.meta.lead_minutes)
    } else {
        Duration::minutes(FALLBACK_LEAD_MINUTES)
    }
}

/// Pending, unchecked slots eligible at `now`.
///
/// Eligible means `-grace <= minutes until trigger <= lookahead`. When none
/// qualify and `find_next` is set, the nearest slot whose trigger time has
/// not yet passed the grace period is returned instead.
pub fn due_slots(schedule: &Schedule, now: DateTime<Utc>, config: &SchedulerConfig) -> Vec<DueSlot> {
    let lead = schedule_lead(schedule);
    let candidates: Vec<DueSlot> = schedule
        .pending_slots()
        .map(|slot| {
            let trigger_at = slot.trigger_at(lead);
            DueSlot {
                slot_id: slot.id(),
                start_ts: slot.start_ts,
                trigger_at,
                minutes_until_trigger: slot.minutes_until_trigger(now, lead),
                reason: DueReason::InWindow,
            }
        })
        .collect();

    let in_window: Vec<DueSlot> = candidates
        .iter()
        .filter(|d| {
            d.minutes_until_trigger >= -config.grace_minutes
                && d.minutes_until_trigger <= config.lookahead_minutes
        })
        .cloned()
        .collect();

    if !in_window.is_empty() || !config.find_next {
        return in_window;
    }

    candidates
        .into_iter()
        .filter(|d| d.minutes_until_trigger > -config.grace_minutes)
        .min_by(|a, b| a.minutes_until_trigger.total_cmp(&b.minutes_until_trigger))
        .map(|d| DueSlot {
            reason: DueReason::NextUp,
            ..d
        })
        .into_iter()
        .collect()
}

/// What one slot check did
#[derive(Debug, Clone, PartialEq)]
pub enum SlotCheck {
    Checked {
        status: SlotStatus,
        failed_open: bool,
        published: bool,
    },
    /// Another check already moved the slot out of `pending`
    AlreadyChecked,
    /// Another check of the same slot is running
    InFlight,
    /// The schedule was replaced and no longer has this slot
    Superseded,
}

/// Summary of one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub due: usize,
    pub checked: usize,
    pub confirmed: usize,
    pub postponed: usize,
    pub failed_open: usize,
    pub already_checked: usize,
    pub publish_failures: usize,
    pub errors: usize,
}

/// Marks a slot as being checked until dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<SlotId>>,
    id: SlotId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<SlotId>>, id: &SlotId) -> Option<Self> {
        set.lock().insert(id.clone()).then(|| Self {
            set,
            id: id.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

pub struct TriggerScheduler {
    state: Arc<ScheduleState>,
    engine: Arc<DecisionEngine>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    in_flight: Mutex<HashSet<SlotId>>,
}

impl TriggerScheduler {
    pub fn new(
        state: Arc<ScheduleState>,
        engine: Arc<DecisionEngine>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            state,
            engine,
            publisher,
            clock,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn port_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.config.port_timeout_secs.max(1))
    }

    /// Slots the next scan would check
    pub fn preview(&self) -> AppResult<Vec<DueSlot>> {
        let schedule = self.state.require()?;
        Ok(due_slots(&schedule, self.clock.now(), &self.config))
    }

    /// One scan pass. A failing slot never stops the others.
    pub async fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        if self.state.is_dirty() && self.state.persist().await.is_ok() {
            info!("persisted schedule left over from an earlier failure");
        }

        let Some(schedule) = self.state.current() else {
            debug!("no schedule loaded, nothing to scan");
            return report;
        };

        let due = due_slots(&schedule, self.clock.now(), &self.config);
        report.due = due.len();

        for slot in &due {
            debug!(
                slot_id = %slot.slot_id,
                minutes_until_trigger = slot.minutes_until_trigger,
                reason = ?slot.reason,
                "slot due for check"
            );
            match self.check_slot(&slot.slot_id).await {
                Ok(SlotCheck::Checked {
                    status,
                    failed_open,
                    published,
                }) => {
                    report.checked += 1;
                    match status {
                        SlotStatus::Confirmed => report.confirmed += 1,
                        SlotStatus::Postponed => report.postponed += 1,
                        _ => {}
                    }
                    if failed_open {
                        report.failed_open += 1;
                    }
                    if !published {
                        report.publish_failures += 1;
                    }
                }
                Ok(SlotCheck::AlreadyChecked | SlotCheck::InFlight | SlotCheck::Superseded) => {
                    report.already_checked += 1;
                }
                Err(e) => {
                    warn!(slot_id = %slot.slot_id, code = e.code(), "slot check failed: {e}");
                    report.errors += 1;
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                checked = report.checked,
                confirmed = report.confirmed,
                postponed = report.postponed,
                failed_open = report.failed_open,
                already_checked = report.already_checked,
                "trigger scan finished"
            );
        }
        report
    }

    /// Check one slot and commit the outcome. Repeating the call for a slot
    /// that was already checked changes nothing.
    pub async fn check_slot(&self, id: &SlotId) -> AppResult<SlotCheck> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, id) else {
            return Ok(SlotCheck::InFlight);
        };

        let schedule = self.state.require()?;
        let slot = schedule
            .slot(id)
            .ok_or_else(|| AppError::NotFound(format!("slot {}", id)))?;
        if !slot.awaiting_check() {
            return Ok(SlotCheck::AlreadyChecked);
        }
        let trigger_at = slot.trigger_at(schedule_lead(&schedule));
        drop(schedule);

        let now = self.clock.now();
        let (result, failed_open) = match self.engine.evaluate_as_of(trigger_at).await {
            Ok(result) => (result, false),
            Err(e) => {
                warn!(slot_id = %id, code = e.code(), "forecast check failed, irrigating on schedule: {e}");
                (ForecastResult::fail_open(now, e.to_string()), true)
            }
        };

        let updated = match self
            .state
            .update_slot(id, |slot| apply_forecast_result(slot, result, now))
        {
            Ok(slot) => slot,
            Err(AppError::InvalidStateTransition(_)) => return Ok(SlotCheck::AlreadyChecked),
            Err(AppError::NotFound(_)) => {
                info!(slot_id = %id, "schedule replaced during check, result dropped");
                return Ok(SlotCheck::Superseded);
            }
            Err(e) => return Err(e),
        };

        info!(
            slot_id = %id,
            status = %updated.status,
            reason = updated
                .forecast_result
                .as_ref()
                .map(|r| r.recommendation.reason.as_str())
                .unwrap_or_default(),
            "slot checked"
        );

        let published = match updated.forecast_result.clone() {
            Some(result) => self.publish(id, result).await,
            None => false,
        };

        // The committed transition stands even if this save fails; the next
        // scan retries it.
        let _ = self.state.persist().await;

        Ok(SlotCheck::Checked {
            status: updated.status,
            failed_open,
            published,
        })
    }

    async fn publish(&self, id: &SlotId, result: ForecastResult) -> bool {
        let event = DecisionEvent {
            slot_id: Some(id.clone()),
            result,
        };
        match tokio::time::timeout(self.port_timeout(), self.publisher.publish_decision(&event)).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(slot_id = %id, code = e.code(), "decision not published: {e}");
                false
            }
            Err(_) => {
                warn!(slot_id = %id, "decision publish timed out");
                false
            }
        }
    }
}
