//! Seasonal 7-day irrigation plan builder
//!
//! A pure transformation from daily forecast aggregates and soil references
//! to a [`Schedule`]. Running it twice on the same inputs gives the same plan.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use shared::{
    aggregate_daily, round2, DailyForecast, DayPlan, HorizonGroup, HorizonSummary, Schedule,
    ScheduleMeta, SeasonConfig, SensorReading, Slot, SlotBook, SlotStatus, WaterBalance,
    WeatherRow,
};

use crate::config::PlannerConfig;
use crate::error::{AppError, AppResult};

/// Mode tag written into generated schedules
pub const PLAN_MODE: &str = "scheduler_rule_based_v1";

/// How a day's forecast rainfall is classified for planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    /// Skip all irrigation and use the rain
    HeavyRain,
    /// Only a catch-up slot when the soil is critically dry
    MediumRain,
    /// Irrigate by how dry the soil is
    LowRain,
}

#[derive(Debug, Clone)]
pub struct PlanBuilder {
    config: PlannerConfig,
    morning: NaiveTime,
    evening: NaiveTime,
}

impl PlanBuilder {
    pub fn new(config: PlannerConfig) -> AppResult<Self> {
        let hour = |h: u32, name: &str| {
            NaiveTime::from_hms_opt(h, 0, 0)
                .ok_or_else(|| AppError::Configuration(format!("planner.{name} must be 0-23, got {h}")))
        };
        let morning = hour(config.morning_hour, "morning_hour")?;
        let evening = hour(config.evening_hour, "evening_hour")?;
        if config.days == 0 {
            return Err(AppError::Configuration("planner.days must be positive".into()));
        }
        Ok(Self {
            config,
            morning,
            evening,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn lead(&self) -> Duration {
        Duration::minutes(self.config.lead_minutes)
    }

    /// Farm local time minus UTC
    pub fn offset(&self) -> Duration {
        Duration::hours(i64::from(self.config.utc_offset_hours))
    }

    /// UTC instant of local midnight starting `date`
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(NaiveTime::MIN).and_utc() - self.offset()
    }

    /// Farm-local calendar date of a UTC instant
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + self.offset()).date_naive()
    }

    /// The days to plan: tomorrow onwards, in farm-local dates
    pub fn planned_dates(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let today = self.local_date(now);
        (1..=self.config.days as i64)
            .map(|i| today + Duration::days(i))
            .collect()
    }

    /// One forecast aggregate per planned date.
    ///
    /// Dates the hourly forecast does not cover take the rainfall of the
    /// matching day among the most recent history days, with probability
    /// and weather code zero.
    pub fn daily_forecasts(
        &self,
        dates: &[NaiveDate],
        forecast: &[WeatherRow],
        history: &[WeatherRow],
    ) -> Vec<DailyForecast> {
        let by_date: BTreeMap<NaiveDate, DailyForecast> = aggregate_daily(&self.to_local(forecast))
            .into_iter()
            .map(|d| (d.date, d))
            .collect();

        let recent_history = aggregate_daily(&self.to_local(history));
        let recent = &recent_history[recent_history.len().saturating_sub(dates.len())..];

        let mut fallback_used = 0;
        let days: Vec<DailyForecast> = dates
            .iter()
            .enumerate()
            .map(|(i, date)| match by_date.get(date) {
                Some(day) => day.clone(),
                None => {
                    fallback_used += 1;
                    DailyForecast {
                        rain_mm: recent.get(i).map(|d| d.rain_mm).unwrap_or(0.0),
                        ..DailyForecast::dry(*date)
                    }
                }
            })
            .collect();

        if fallback_used > 0 {
            tracing::warn!(
                days = fallback_used,
                "forecast missing for some days, using pseudo-forecast from history"
            );
        }
        days
    }

    /// Soil moisture reference per planned date: daily means of the most
    /// recent history days mapped date-for-date onto the plan.
    pub fn soil_references(&self, dates: &[NaiveDate], history: &[SensorReading]) -> Vec<f64> {
        let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for r in history {
            let entry = by_day.entry(self.local_date(r.timestamp)).or_insert((0.0, 0));
            entry.0 += r.soil_moisture;
            entry.1 += 1;
        }
        let means: Vec<f64> = by_day.values().map(|(sum, n)| sum / *n as f64).collect();
        let recent = &means[means.len().saturating_sub(dates.len())..];

        (0..dates.len())
            .map(|i| recent.get(i).copied().unwrap_or(self.config.default_soil_moisture))
            .collect()
    }

    pub fn classify(&self, day: &DailyForecast, season: &SeasonConfig) -> DayClass {
        let is_fog = self.config.fog_band.contains(day.weather_code_main);
        if day.rain_mm >= season.heavy_rain_mm
            && day.pop_max >= self.config.heavy_rain_probability
            && !is_fog
        {
            DayClass::HeavyRain
        } else if day.rain_mm >= season.medium_rain_mm && !is_fog {
            DayClass::MediumRain
        } else {
            DayClass::LowRain
        }
    }

    /// Plan one day: the day record and its slots
    pub fn plan_day(&self, index: usize, day: &DailyForecast, soil_ref: f64) -> (DayPlan, Vec<Slot>) {
        let season = self.config.seasons.for_month(chrono::Datelike::month(&day.date));
        let horizon_group = HorizonGroup::for_day_index(index);
        let rain = day.rain_mm;
        let cfg = &self.config;

        let (slot_plan, note, note_vi): (Vec<(NaiveTime, u32)>, String, String) =
            match self.classify(day, season) {
                DayClass::HeavyRain => (
                    vec![],
                    format!(
                        "Heavy rain expected (~{:.1} mm, pop_max {:.0}%); defer all irrigation to use the rainfall.",
                        rain,
                        day.pop_max * 100.0
                    ),
                    format!(
                        "Mưa lớn dự kiến ~{:.1}mm (pop_max={:.0}%), hoãn toàn bộ tưới để tận dụng nước trời.",
                        rain,
                        day.pop_max * 100.0
                    ),
                ),
                DayClass::MediumRain if soil_ref < season.critical_moisture => (
                    vec![(self.morning, cfg.catch_up_duration_min)],
                    format!(
                        "Medium rain (~{:.1} mm) but soil very dry ({:.1}%); light {}-minute morning catch-up.",
                        rain, soil_ref, cfg.catch_up_duration_min
                    ),
                    format!(
                        "Mưa vừa ~{:.1}mm, đất rất khô ({:.1}%), tưới nhẹ {} phút buổi sáng (tưới bù).",
                        rain, soil_ref, cfg.catch_up_duration_min
                    ),
                ),
                DayClass::MediumRain => (
                    vec![],
                    format!(
                        "Medium rain (~{:.1} mm), soil moist enough ({:.1}%); no irrigation.",
                        rain, soil_ref
                    ),
                    format!("Mưa vừa ~{:.1}mm, đất đủ ẩm ({:.1}%), không tưới.", rain, soil_ref),
                ),
                DayClass::LowRain if soil_ref < season.critical_moisture => (
                    vec![
                        (self.morning, cfg.critical_duration_min),
                        (self.evening, cfg.critical_duration_min),
                    ],
                    format!(
                        "Little rain and soil very dry ({:.1}%); irrigate twice for {} minutes.",
                        soil_ref, cfg.critical_duration_min
                    ),
                    format!(
                        "Ít mưa trong ngày và đất rất khô ({:.1}%), tưới 2 lần {} phút.",
                        soil_ref, cfg.critical_duration_min
                    ),
                ),
                DayClass::LowRain if soil_ref < season.ok_moisture => (
                    vec![(self.morning, cfg.low_duration_min)],
                    format!(
                        "Little rain and soil fairly dry ({:.1}%); irrigate once for {} minutes.",
                        soil_ref, cfg.low_duration_min
                    ),
                    format!(
                        "Ít mưa trong ngày và đất khá khô ({:.1}%), tưới 1 lần {} phút.",
                        soil_ref, cfg.low_duration_min
                    ),
                ),
                DayClass::LowRain => (
                    vec![],
                    format!("Soil moist enough ({:.1}%), little rain; no irrigation needed.", soil_ref),
                    format!("Đất đủ ẩm ({:.1}%), mưa ít, chưa cần tưới.", soil_ref),
                ),
            };

        let slots: Vec<Slot> = slot_plan
            .into_iter()
            .map(|(time, duration_min)| {
                let start_ts = day.date.and_time(time).and_utc() - self.offset();
                Slot {
                    start_ts,
                    end_ts: start_ts + Duration::minutes(i64::from(duration_min)),
                    device_id: cfg.device_id.clone(),
                    duration_min,
                    rain_mm_day: round2(rain),
                    soil_moist_ref: round2(soil_ref),
                    date: day.date,
                    horizon_group,
                    season: season.name.clone(),
                    forecast_trigger_ts: Some(start_ts - self.lead()),
                    status: SlotStatus::Pending,
                    forecast_result: None,
                    forecast_checked_at: None,
                }
            })
            .collect();

        let plan = DayPlan {
            date: day.date,
            season: season.name.clone(),
            horizon_group,
            rain_mm: round2(rain),
            pop_max: day.pop_max,
            weather_code: day.weather_code_main,
            soil_moist_ref: round2(soil_ref),
            total_irrigation_min: slots.iter().map(|s| s.duration_min).sum(),
            note,
            note_vi,
            slot_ids: slots.iter().map(Slot::id).collect(),
        };

        (plan, slots)
    }

    /// Assemble the schedule from aligned per-day forecasts and soil references
    pub fn build(
        &self,
        forecasts: &[DailyForecast],
        soil_refs: &[f64],
        generated_at: DateTime<Utc>,
        mut meta: ScheduleMeta,
    ) -> Schedule {
        let mut days = Vec::with_capacity(forecasts.len());
        let mut slots = Vec::new();
        for (index, day) in forecasts.iter().enumerate() {
            let soil_ref = soil_refs
                .get(index)
                .copied()
                .unwrap_or(self.config.default_soil_moisture);
            let (plan, day_slots) = self.plan_day(index, day, soil_ref);
            days.push(plan);
            slots.extend(day_slots);
        }

        let target = days
            .first()
            .map(|d| self.config.seasons.for_month(chrono::Datelike::month(&d.date)).target_mm_week)
            .unwrap_or(0.0);
        let water_balance = WaterBalance::compute(&days, target, self.config.mm_per_min);

        meta.days = days.len();
        meta.lead_minutes = self.config.lead_minutes;

        Schedule {
            generated_at,
            location: self.config.location,
            mode: PLAN_MODE.to_string(),
            summary: HorizonSummary::from_days(&days),
            meta,
            water_balance,
            days_detail: days,
            slots: SlotBook::from(slots),
        }
    }

    fn to_local(&self, rows: &[WeatherRow]) -> Vec<WeatherRow> {
        let offset = self.offset();
        rows.iter()
            .map(|r| WeatherRow {
                timestamp: r.timestamp + offset,
                ..r.clone()
            })
            .collect()
    }
}
