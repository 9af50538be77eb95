//! Schedule lifecycle: generation, operator overrides, demo rebase

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Timelike, Utc};
use shared::{skip_slot, Schedule, ScheduleMeta, Slot, SlotBook, SlotId, WaterBalance};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::external::Publisher;
use crate::services::clock::Clock;
use crate::services::data_source::DataSource;
use crate::services::planner::PlanBuilder;
use crate::services::schedule_state::ScheduleState;
use crate::services::sensor_window::SharedWindow;
use crate::services::weather_source::SharedWeather;

/// Local hours during which a demo pulls the first slot to the demo time
const DEMO_HOURS: std::ops::RangeInclusive<u32> = 8..=17;

pub struct ScheduleService {
    state: Arc<ScheduleState>,
    planner: PlanBuilder,
    data: DataSource,
    weather: SharedWeather,
    window: SharedWindow,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    publish_timeout: StdDuration,
    demo_lead: Duration,
}

impl ScheduleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<ScheduleState>,
        planner: PlanBuilder,
        data: DataSource,
        weather: SharedWeather,
        window: SharedWindow,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        publish_timeout: StdDuration,
        demo_lead: Duration,
    ) -> Self {
        Self {
            state,
            planner,
            data,
            weather,
            window,
            publisher,
            clock,
            publish_timeout,
            demo_lead,
        }
    }

    pub fn state(&self) -> &Arc<ScheduleState> {
        &self.state
    }

    pub fn current(&self) -> AppResult<Arc<Schedule>> {
        self.state.require()
    }

    /// Build a fresh plan for the coming days and make it current.
    ///
    /// Slot statuses of the previous plan are not carried over.
    pub async fn regenerate(&self) -> AppResult<Arc<Schedule>> {
        let now = self.clock.now();
        let dates = self.planner.planned_dates(now);
        let (first, last) = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(AppError::Configuration("planner has no days to plan".into())),
        };

        let today_start = self.planner.day_start(self.planner.local_date(now));
        let forecast = self
            .weather
            .range(self.planner.day_start(first), self.planner.day_start(last) + Duration::days(1));
        let history = self.weather.range(
            today_start - Duration::days(dates.len() as i64),
            today_start,
        );

        let data = self.data.clone();
        let mut sensor_history = tokio::task::spawn_blocking(move || data.load_sensor_history())
            .await
            .map_err(|e| AppError::Internal(format!("sensor history task: {}", e)))??;
        let live = self.window.read().snapshot();
        if let Some(cutoff) = live.first().map(|r| r.timestamp) {
            sensor_history.retain(|r| r.timestamp < cutoff);
        }
        sensor_history.extend(live);

        let forecasts = self.planner.daily_forecasts(&dates, &forecast, &history);
        let soil_refs = self.planner.soil_references(&dates, &sensor_history);
        let meta = ScheduleMeta {
            source_sensor: self.data.sensor_label(),
            source_api: self.data.weather_label(),
            ..ScheduleMeta::default()
        };
        let schedule = self.planner.build(&forecasts, &soil_refs, now, meta);

        info!(
            first_day = %first,
            slots = schedule.slots.len(),
            irrigation_min = schedule.water_balance.irrigation_min_7d,
            balance = ?schedule.water_balance.status,
            "schedule generated"
        );

        let schedule = self.state.replace(schedule);
        let _ = self.state.persist().await;
        self.publish(&schedule).await;
        Ok(schedule)
    }

    /// Use the saved schedule when it is from today or later, otherwise
    /// generate a new one.
    pub async fn load_or_regenerate(&self) -> AppResult<Arc<Schedule>> {
        let today = self.planner.local_date(self.clock.now());
        match self.state.restore().await {
            Ok(Some(schedule)) if self.planner.local_date(schedule.generated_at) >= today => {
                info!(
                    generated_at = %schedule.generated_at,
                    slots = schedule.slots.len(),
                    "loaded saved schedule"
                );
                return Ok(schedule);
            }
            Ok(Some(schedule)) => {
                info!(generated_at = %schedule.generated_at, "saved schedule is stale")
            }
            Ok(None) => info!("no saved schedule"),
            Err(e) => warn!(code = e.code(), "saved schedule unreadable: {e}"),
        }
        self.regenerate().await
    }

    /// Operator override: `pending -> skipped`
    pub async fn skip_slot(&self, id: &SlotId) -> AppResult<Slot> {
        let slot = self.state.update_slot(id, skip_slot)?;
        info!(slot_id = %id, "slot skipped by operator");
        let _ = self.state.persist().await;
        Ok(slot)
    }

    /// Shift the current schedule onto the demo date, see [`rebase_schedule`]
    pub async fn rebase_for_demo(&self, demo_at: Option<DateTime<Utc>>) -> AppResult<Arc<Schedule>> {
        let demo_at = demo_at.unwrap_or_else(|| self.clock.now());
        let current = self.state.require()?;
        let rebased = rebase_schedule(&current, demo_at, self.planner.offset(), self.demo_lead);

        info!(
            demo_at = %demo_at,
            first_day = ?rebased.days_detail.first().map(|d| d.date),
            lead_minutes = self.demo_lead.num_minutes(),
            "schedule rebased for demo"
        );

        let schedule = self.state.replace(rebased);
        let _ = self.state.persist().await;
        self.publish(&schedule).await;
        Ok(schedule)
    }

    async fn publish(&self, schedule: &Schedule) {
        match tokio::time::timeout(self.publish_timeout, self.publisher.publish_schedule(schedule))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(code = e.code(), "schedule not published: {e}"),
            Err(_) => warn!("schedule publish timed out"),
        }
    }
}

/// Move a schedule so its first day is the demo date.
///
/// Every date and time shifts by whole days. When the demo time falls in
/// local working hours, the earliest slot of the demo date starts at the demo
/// time (seconds dropped) with its duration kept. Trigger times are then
/// recomputed with `lead`. Slot statuses are kept.
pub fn rebase_schedule(
    schedule: &Schedule,
    demo_at: DateTime<Utc>,
    utc_offset: Duration,
    lead: Duration,
) -> Schedule {
    let local_demo = demo_at + utc_offset;
    let demo_date = local_demo.date_naive();
    let first_date = schedule
        .days_detail
        .first()
        .map(|d| d.date)
        .or_else(|| schedule.slots.iter().next().map(|s| s.date));
    let shift = first_date
        .map(|first| Duration::days((demo_date - first).num_days()))
        .unwrap_or_else(Duration::zero);

    let mut days = schedule.days_detail.clone();
    for day in &mut days {
        day.date += shift;
    }

    let mut slots: Vec<Slot> = schedule
        .slots
        .iter()
        .cloned()
        .map(|mut slot| {
            slot.start_ts += shift;
            slot.end_ts += shift;
            slot.date += shift;
            slot
        })
        .collect();

    if DEMO_HOURS.contains(&local_demo.hour()) {
        let demo_start = demo_at
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(demo_at);
        let earliest = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.date == demo_date)
            .min_by_key(|(_, s)| s.start_ts)
            .map(|(i, _)| i);

        if let Some(i) = earliest {
            let taken = slots
                .iter()
                .enumerate()
                .any(|(j, s)| j != i && s.start_ts == demo_start);
            if taken {
                warn!(demo_start = %demo_start, "demo time collides with another slot, not moved");
            } else {
                let slot = &mut slots[i];
                let duration = slot.end_ts - slot.start_ts;
                slot.start_ts = demo_start;
                slot.end_ts = demo_start + duration;
            }
        }
    }

    for slot in &mut slots {
        slot.forecast_trigger_ts = Some(slot.start_ts - lead);
    }
    let slots = SlotBook::from(slots);

    for day in &mut days {
        let day_slots: Vec<&Slot> = slots.iter().filter(|s| s.date == day.date).collect();
        day.slot_ids = day_slots.iter().map(|s| s.id()).collect();
        day.total_irrigation_min = day_slots.iter().map(|s| s.duration_min).sum();
    }

    let water_balance = WaterBalance::compute(
        &days,
        schedule.water_balance.target_mm_7d,
        schedule.water_balance.mm_per_min_irrigation,
    );

    Schedule {
        generated_at: demo_at,
        meta: ScheduleMeta {
            lead_minutes: lead.num_minutes(),
            ..schedule.meta.clone()
        },
        water_balance,
        days_detail: days,
        slots,
        ..schedule.clone()
    }
}
