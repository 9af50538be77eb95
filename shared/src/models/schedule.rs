//! Irrigation schedule: slots, day plans and the schedule aggregate

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::decision::ForecastResult;
use crate::types::{format_utc, Location};

/// Immutable slot identity: the canonical encoding of its start time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn from_start(start: &DateTime<Utc>) -> Self {
        Self(format_utc(start))
    }

    /// Parse an id given in any accepted timestamp form
    pub fn parse(raw: &str) -> Option<Self> {
        crate::types::parse_utc(raw).map(|ts| Self::from_start(&ts))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slot lifecycle: `pending` moves once to a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[default]
    Pending,
    Confirmed,
    Postponed,
    Skipped,
}

impl SlotStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotStatus::Pending)
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SlotStatus::Pending => "pending",
            SlotStatus::Confirmed => "confirmed",
            SlotStatus::Postponed => "postponed",
            SlotStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Near / mid / far bucket of the 7-day plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HorizonGroup {
    #[serde(rename = "d1_2")]
    Days1To2,
    #[serde(rename = "d3_5")]
    Days3To5,
    #[serde(rename = "d6_7")]
    Days6To7,
}

impl HorizonGroup {
    /// Group for the zero-based day index within the plan
    pub fn for_day_index(index: usize) -> Self {
        match index {
            0 | 1 => HorizonGroup::Days1To2,
            2..=4 => HorizonGroup::Days3To5,
            _ => HorizonGroup::Days6To7,
        }
    }
}

/// One planned irrigation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(with = "crate::types::utc_z")]
    pub start_ts: DateTime<Utc>,
    #[serde(with = "crate::types::utc_z")]
    pub end_ts: DateTime<Utc>,
    pub device_id: String,
    pub duration_min: u32,
    #[serde(default)]
    pub rain_mm_day: f64,
    #[serde(default)]
    pub soil_moist_ref: f64,
    pub date: NaiveDate,
    pub horizon_group: HorizonGroup,
    pub season: String,
    /// When the pre-irrigation check should run. Older files may omit it.
    #[serde(default, with = "crate::types::utc_z::option")]
    pub forecast_trigger_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: SlotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_result: Option<ForecastResult>,
    #[serde(
        default,
        with = "crate::types::utc_z::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub forecast_checked_at: Option<DateTime<Utc>>,
}

impl Slot {
    pub fn id(&self) -> SlotId {
        SlotId::from_start(&self.start_ts)
    }

    /// Trigger time, defaulting to `lead` before the start
    pub fn trigger_at(&self, lead: Duration) -> DateTime<Utc> {
        self.forecast_trigger_ts.unwrap_or(self.start_ts - lead)
    }

    /// Signed minutes from `now` until the trigger time
    pub fn minutes_until_trigger(&self, now: DateTime<Utc>, lead: Duration) -> f64 {
        (self.trigger_at(lead) - now).num_milliseconds() as f64 / 60_000.0
    }

    pub fn is_checked(&self) -> bool {
        self.forecast_checked_at.is_some()
    }

    /// Pending and not yet checked
    pub fn awaiting_check(&self) -> bool {
        self.status == SlotStatus::Pending && !self.is_checked()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("slot {0} was already checked")]
    AlreadyChecked(SlotId),

    #[error("slot {id} is {status}, expected pending")]
    NotPending { id: SlotId, status: SlotStatus },
}

/// Record a forecast check on a slot.
///
/// The slot moves to `confirmed` when the recommendation is to irrigate and
/// to `postponed` otherwise. A slot that already left `pending` or was
/// already checked is rejected, so repeating the call cannot change it.
pub fn apply_forecast_result(
    slot: &Slot,
    result: ForecastResult,
    checked_at: DateTime<Utc>,
) -> Result<Slot, TransitionError> {
    if slot.is_checked() {
        return Err(TransitionError::AlreadyChecked(slot.id()));
    }
    if slot.status != SlotStatus::Pending {
        return Err(TransitionError::NotPending {
            id: slot.id(),
            status: slot.status,
        });
    }

    let status = if result.recommendation.should_irrigate {
        SlotStatus::Confirmed
    } else {
        SlotStatus::Postponed
    };

    Ok(Slot {
        status,
        forecast_result: Some(result),
        forecast_checked_at: Some(checked_at),
        ..slot.clone()
    })
}

/// Operator override: `pending -> skipped`
pub fn skip_slot(slot: &Slot) -> Result<Slot, TransitionError> {
    if slot.status != SlotStatus::Pending {
        return Err(TransitionError::NotPending {
            id: slot.id(),
            status: slot.status,
        });
    }
    Ok(Slot {
        status: SlotStatus::Skipped,
        ..slot.clone()
    })
}

/// One planned day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub season: String,
    pub horizon_group: HorizonGroup,
    pub rain_mm: f64,
    #[serde(default)]
    pub pop_max: f64,
    #[serde(default)]
    pub weather_code: u16,
    pub soil_moist_ref: f64,
    pub total_irrigation_min: u32,
    pub note: String,
    #[serde(default)]
    pub note_vi: String,
    /// Slots planned for this day, in start order
    #[serde(default)]
    pub slot_ids: Vec<SlotId>,
}

/// Horizon summaries: the day notes of each group joined by `" | "`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HorizonSummary {
    pub horizon_1_2_days: String,
    pub horizon_3_5_days: String,
    pub horizon_7_days: String,
}

impl HorizonSummary {
    pub fn from_days(days: &[DayPlan]) -> Self {
        let join = |group: HorizonGroup| {
            days.iter()
                .filter(|d| d.horizon_group == group)
                .map(|d| d.note.as_str())
                .collect::<Vec<_>>()
                .join(" | ")
        };
        Self {
            horizon_1_2_days: join(HorizonGroup::Days1To2),
            horizon_3_5_days: join(HorizonGroup::Days3To5),
            horizon_7_days: join(HorizonGroup::Days6To7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Deficit,
    Ok,
    Excess,
}

impl BalanceStatus {
    pub fn classify(total_mm: f64, target_mm: f64) -> Self {
        if total_mm < 0.8 * target_mm {
            BalanceStatus::Deficit
        } else if total_mm > 1.2 * target_mm {
            BalanceStatus::Excess
        } else {
            BalanceStatus::Ok
        }
    }

    pub fn comment(&self) -> &'static str {
        match self {
            BalanceStatus::Deficit => "Below the weekly target; irrigation time could be increased.",
            BalanceStatus::Excess => "Above the weekly target; irrigation could be reduced.",
            BalanceStatus::Ok => "Rain plus irrigation for the week is close to the target.",
        }
    }
}

/// Advisory weekly water accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterBalance {
    pub rain_mm_7d: f64,
    pub irrigation_min_7d: u32,
    pub irrigation_mm_7d: f64,
    pub target_mm_7d: f64,
    pub total_mm_7d: f64,
    pub status: BalanceStatus,
    pub comment: String,
    pub mm_per_min_irrigation: f64,
}

impl WaterBalance {
    pub fn compute(days: &[DayPlan], target_mm: f64, mm_per_min: f64) -> Self {
        let rain_mm_7d: f64 = days.iter().map(|d| d.rain_mm).sum();
        let irrigation_min_7d: u32 = days.iter().map(|d| d.total_irrigation_min).sum();
        let irrigation_mm_7d = f64::from(irrigation_min_7d) * mm_per_min;
        let total_mm_7d = rain_mm_7d + irrigation_mm_7d;
        let status = BalanceStatus::classify(total_mm_7d, target_mm);

        Self {
            rain_mm_7d: crate::types::round2(rain_mm_7d),
            irrigation_min_7d,
            irrigation_mm_7d: crate::types::round2(irrigation_mm_7d),
            target_mm_7d: target_mm,
            total_mm_7d: crate::types::round2(total_mm_7d),
            status,
            comment: status.comment().to_string(),
            mm_per_min_irrigation: mm_per_min,
        }
    }
}

/// Provenance of a generated schedule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleMeta {
    #[serde(default)]
    pub source_sensor: String,
    #[serde(default)]
    pub source_api: String,
    #[serde(default)]
    pub days: usize,
    #[serde(default)]
    pub lead_minutes: i64,
}

/// Slots in start order with an index by id.
///
/// Serialized as a plain list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Slot>", into = "Vec<Slot>")]
pub struct SlotBook {
    slots: Vec<Slot>,
    index: HashMap<SlotId, usize>,
}

impl SlotBook {
    pub fn get(&self, id: &SlotId) -> Option<&Slot> {
        self.index.get(id).map(|&i| &self.slots[i])
    }

    /// Replace the slot with the same id, returning the previous value.
    /// Unknown ids are left untouched and the slot is handed back.
    pub fn replace(&mut self, slot: Slot) -> Result<Slot, Slot> {
        match self.index.get(&slot.id()) {
            Some(&i) => Ok(std::mem::replace(&mut self.slots[i], slot)),
            None => Err(slot),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Slot> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[Slot] {
        &self.slots
    }

    /// Rebuild the index after ids were changed through `iter_mut`
    pub fn reindex(&mut self) {
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id(), i))
            .collect();
    }
}

impl From<Vec<Slot>> for SlotBook {
    fn from(mut slots: Vec<Slot>) -> Self {
        slots.sort_by_key(|s| s.start_ts);
        let mut book = Self {
            slots,
            index: HashMap::new(),
        };
        book.reindex();
        book
    }
}

impl From<SlotBook> for Vec<Slot> {
    fn from(book: SlotBook) -> Self {
        book.slots
    }
}

/// The schedule aggregate: a 7-day plan and its slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "timestamp", with = "crate::types::utc_z")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub mode: String,
    pub summary: HorizonSummary,
    #[serde(default)]
    pub meta: ScheduleMeta,
    pub water_balance: WaterBalance,
    pub days_detail: Vec<DayPlan>,
    pub slots: SlotBook,
}

impl Schedule {
    pub fn slot(&self, id: &SlotId) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub fn pending_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.awaiting_check())
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayPlan> {
        self.days_detail.iter().find(|d| d.date == date)
    }

    pub fn slots_for_day(&self, date: NaiveDate) -> Vec<&Slot> {
        self.slots.iter().filter(|s| s.date == date).collect()
    }

    /// Count of slots per status, for reporting
    pub fn status_counts(&self) -> HashMap<SlotStatus, usize> {
        let mut counts = HashMap::new();
        for slot in self.slots.iter() {
            *counts.entry(slot.status).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::decision::{ForecastResult, Recommendation};
    use chrono::TimeZone;

    fn slot_at(hour: u32) -> Slot {
        let start = Utc.with_ymd_and_hms(2025, 6, 3, hour, 0, 0).unwrap();
        Slot {
            start_ts: start,
            end_ts: start + Duration::minutes(20),
            device_id: "esp32-01".to_string(),
            duration_min: 20,
            rain_mm_day: 0.0,
            soil_moist_ref: 22.0,
            date: start.date_naive(),
            horizon_group: HorizonGroup::Days1To2,
            season: "summer_fast_reaction".to_string(),
            forecast_trigger_ts: Some(start - Duration::minutes(10)),
            status: SlotStatus::Pending,
            forecast_result: None,
            forecast_checked_at: None,
        }
    }

    fn result(should_irrigate: bool) -> ForecastResult {
        ForecastResult {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 3, 6, 50, 0).unwrap(),
            predictions: None,
            sensor_ref: None,
            recommendation: Recommendation {
                should_irrigate,
                reason: "test".to_string(),
                reason_vi: None,
                confidence: None,
            },
            error: None,
        }
    }

    #[test]
    fn test_slot_id_is_start_timestamp() {
        assert_eq!(slot_at(7).id().as_str(), "2025-06-03T07:00:00Z");
        assert_eq!(SlotId::parse("2025-06-03T07:00:00"), Some(slot_at(7).id()));
    }

    #[test]
    fn test_apply_result_confirms_or_postpones() {
        let now = Utc::now();
        let confirmed = apply_forecast_result(&slot_at(7), result(true), now).unwrap();
        assert_eq!(confirmed.status, SlotStatus::Confirmed);
        assert_eq!(confirmed.forecast_checked_at, Some(now));

        let postponed = apply_forecast_result(&slot_at(7), result(false), now).unwrap();
        assert_eq!(postponed.status, SlotStatus::Postponed);
    }

    #[test]
    fn test_apply_result_twice_is_rejected() {
        let first = apply_forecast_result(&slot_at(7), result(false), Utc::now()).unwrap();
        let err = apply_forecast_result(&first, result(true), Utc::now()).unwrap_err();
        assert_eq!(err, TransitionError::AlreadyChecked(first.id()));
    }

    #[test]
    fn test_skip_only_from_pending() {
        let skipped = skip_slot(&slot_at(7)).unwrap();
        assert_eq!(skipped.status, SlotStatus::Skipped);
        assert!(skip_slot(&skipped).is_err());
        assert!(apply_forecast_result(&skipped, result(true), Utc::now()).is_err());
    }

    #[test]
    fn test_trigger_defaults_to_lead_before_start() {
        let mut slot = slot_at(7);
        slot.forecast_trigger_ts = None;
        let trigger = slot.trigger_at(Duration::minutes(10));
        assert_eq!(trigger, slot.start_ts - Duration::minutes(10));

        let now = slot.start_ts - Duration::minutes(25);
        assert!((slot.minutes_until_trigger(now, Duration::minutes(10)) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_slot_book_replace_by_id() {
        let mut book = SlotBook::from(vec![slot_at(17), slot_at(7)]);
        assert_eq!(book.as_slice()[0].start_ts.format("%H").to_string(), "07");

        let mut updated = slot_at(17);
        updated.status = SlotStatus::Skipped;
        let old = book.replace(updated).unwrap();
        assert_eq!(old.status, SlotStatus::Pending);
        assert_eq!(book.get(&slot_at(17).id()).unwrap().status, SlotStatus::Skipped);

        assert!(book.replace(slot_at(9)).is_err());
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_horizon_groups() {
        let groups: Vec<_> = (0..7).map(HorizonGroup::for_day_index).collect();
        assert_eq!(groups[0], HorizonGroup::Days1To2);
        assert_eq!(groups[1], HorizonGroup::Days1To2);
        assert_eq!(groups[2], HorizonGroup::Days3To5);
        assert_eq!(groups[4], HorizonGroup::Days3To5);
        assert_eq!(groups[5], HorizonGroup::Days6To7);
        assert_eq!(groups[6], HorizonGroup::Days6To7);
        assert_eq!(serde_json::to_string(&groups[2]).unwrap(), "\"d3_5\"");
    }

    #[test]
    fn test_balance_status_bands() {
        assert_eq!(BalanceStatus::classify(55.0, 70.0), BalanceStatus::Deficit);
        assert_eq!(BalanceStatus::classify(57.0, 70.0), BalanceStatus::Ok);
        assert_eq!(BalanceStatus::classify(83.0, 70.0), BalanceStatus::Ok);
        assert_eq!(BalanceStatus::classify(84.1, 70.0), BalanceStatus::Excess);
    }

    #[test]
    fn test_legacy_slot_without_trigger_or_status_loads() {
        let json = r#"{"start_ts": "2025-06-03T07:00:00", "end_ts": "2025-06-03T07:20:00",
            "device_id": "esp32-01", "duration_min": 20, "rain_mm_day": 0.0,
            "soil_moist_ref": 22.0, "date": "2025-06-03", "horizon_group": "d1_2",
            "season": "summer_fast_reaction"}"#;
        let slot: Slot = serde_json::from_str(json).unwrap();
        assert_eq!(slot.status, SlotStatus::Pending);
        assert!(slot.forecast_trigger_ts.is_none());
        assert_eq!(slot.id().as_str(), "2025-06-03T07:00:00Z");
    }
}
