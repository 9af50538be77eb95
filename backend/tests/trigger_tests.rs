//! Slot trigger scan integration tests
//!
//! Property 1: Checking a slot twice has the same effect as checking it once
//! Property 2: A check that fails for any reason confirms the slot
//! Property 3: A committed transition survives publish and persistence failures
//! Property 4: A scan started after a regeneration never touches the new schedule

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::*;
use irrigation_backend::config::SchedulerConfig;
use irrigation_backend::external::{ForecastModel, ModelPrediction};
use irrigation_backend::services::{due_slots, Clock, ScheduleState, SlotCheck};
use irrigation_backend::AppResult;
use proptest::prelude::*;
use tokio_test::assert_ok;
use shared::{FeatureVector, SlotId, SlotStatus};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Minutes between now and a 07:00 trigger, spanning well beyond the window
fn offset_strategy() -> impl Strategy<Value = i64> {
    -60i64..=60
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: a slot is due exactly when -grace <= minutes until trigger <= lookahead
    #[test]
    fn prop_due_window_bounds(offset in offset_strategy()) {
        let schedule = schedule_with_slots(&[t(7, 10)]);
        let trigger = t(7, 0);
        let now = trigger - Duration::minutes(offset);
        let config = SchedulerConfig::default();

        let due = due_slots(&schedule, now, &config);
        let expected = (offset as f64) >= -config.grace_minutes
            && (offset as f64) <= config.lookahead_minutes;
        prop_assert_eq!(due.len() == 1, expected);
    }

    /// Property: checked slots are never due again, wherever the clock is
    #[test]
    fn prop_checked_slot_never_due(offset in offset_strategy()) {
        let mut schedule = schedule_with_slots(&[t(7, 10)]);
        let id = SlotId::from_start(&t(7, 10));
        let checked = shared::apply_forecast_result(
            schedule.slot(&id).unwrap(),
            shared::ForecastResult::fail_open(t(7, 0), "x"),
            t(7, 0),
        ).unwrap();
        schedule.slots.replace(checked).unwrap();

        let config = SchedulerConfig { find_next: true, ..SchedulerConfig::default() };
        let due = due_slots(&schedule, t(7, 0) - Duration::minutes(offset), &config);
        prop_assert!(due.is_empty());
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_confirms_dry_slot() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            25.0,
            t(6, 45),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.due, 1);
        assert_eq!(report.checked, 1);
        assert_eq!(report.confirmed, 1);

        let slot = h.slot(t(7, 0));
        assert_eq!(slot.status, SlotStatus::Confirmed);
        assert_eq!(slot.forecast_checked_at, Some(t(6, 45)));
        let result = slot.forecast_result.unwrap();
        assert_eq!(result.recommendation.reason, "critical moisture");
        // As-of reading time, not the check time
        assert_eq!(result.timestamp, t(6, 45));

        let events = h.publisher.decisions.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].slot_id, Some(SlotId::from_start(&t(7, 0))));
        assert_eq!(h.store.inner.save_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_postpones_when_rain_likely() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.8)),
            50.0,
            t(6, 45),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.postponed, 1);

        let slot = h.slot(t(7, 0));
        assert_eq!(slot.status, SlotStatus::Postponed);
        assert_eq!(
            slot.forecast_result.unwrap().recommendation.reason,
            "high rain probability"
        );
    }

    #[tokio::test]
    async fn test_second_scan_changes_nothing() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.8)),
            50.0,
            t(6, 45),
        )
        .await;

        h.trigger.scan().await;
        let first = h.slot(t(7, 0));

        h.clock.advance(Duration::minutes(2));
        let report = h.trigger.scan().await;

        assert_eq!(report.due, 0);
        assert_eq!(h.slot(t(7, 0)), first);
        assert_eq!(h.model.calls(), 1);
        assert_eq!(h.publisher.decision_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_recheck_reports_already_checked() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.2)),
            50.0,
            t(6, 45),
        )
        .await;
        let id = SlotId::from_start(&t(7, 0));

        let first = assert_ok!(h.trigger.check_slot(&id).await);
        assert!(matches!(first, SlotCheck::Checked { .. }));

        let second = assert_ok!(h.trigger.check_slot(&id).await);
        assert_eq!(second, SlotCheck::AlreadyChecked);
        assert_eq!(h.model.calls(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_scans_check_once() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.2)),
            50.0,
            t(6, 45),
        )
        .await;

        let (a, b) = tokio::join!(h.trigger.scan(), h.trigger.scan());
        assert_eq!(a.checked + b.checked, 1);
        assert_eq!(h.model.calls(), 1);
        assert_eq!(h.publisher.decision_count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_fails_open() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Fail),
            55.0,
            t(6, 45),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.failed_open, 1);
        assert_eq!(report.confirmed, 1);

        let slot = h.slot(t(7, 0));
        assert_eq!(slot.status, SlotStatus::Confirmed);
        let result = slot.forecast_result.unwrap();
        assert!(result.is_failure());
        assert!(result.recommendation.should_irrigate);
        // Fail-open results carry the check time
        assert_eq!(result.timestamp, t(6, 45));
    }

    #[tokio::test]
    async fn test_out_of_range_probability_fails_open() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Raw(1.7)),
            55.0,
            t(6, 45),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.failed_open, 1);
        assert_eq!(h.slot(t(7, 0)).status, SlotStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_one_failing_slot_does_not_stop_others() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0), t(7, 5)]),
            ScriptedModel::new(vec![Script::Fail, Script::Probability(0.9)]),
            50.0,
            t(6, 50),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.due, 2);
        assert_eq!(report.checked, 2);
        assert_eq!(report.failed_open, 1);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.postponed, 1);
        assert_eq!(h.slot(t(7, 5)).status, SlotStatus::Postponed);
    }

    #[tokio::test]
    async fn test_single_reading_before_trigger_fails_open() {
        let h = Harness::with_window(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            sparse_window(&[t(6, 0), t(7, 30), t(7, 35)], 50.0),
            t(6, 50),
            SchedulerConfig::default(),
        )
        .await;

        let report = h.trigger.scan().await;
        assert_eq!(report.failed_open, 1);
        assert_eq!(h.model.calls(), 0);
        let slot = h.slot(t(7, 0));
        assert_eq!(slot.status, SlotStatus::Confirmed);
        assert!(slot.forecast_result.unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_transition() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            50.0,
            t(6, 45),
        )
        .await;
        h.publisher.fail.store(true, Ordering::SeqCst);

        let report = h.trigger.scan().await;
        assert_eq!(report.publish_failures, 1);
        assert_eq!(h.slot(t(7, 0)).status, SlotStatus::Postponed);
        assert_eq!(h.store.inner.save_count(), 1);

        // Not retried on the next scan
        h.publisher.fail.store(false, Ordering::SeqCst);
        let report = h.trigger.scan().await;
        assert_eq!(report.due, 0);
        assert_eq!(h.publisher.decision_count(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_retried_next_scan() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            50.0,
            t(6, 45),
        )
        .await;
        h.store.fail.store(true, Ordering::SeqCst);

        h.trigger.scan().await;
        assert_eq!(h.slot(t(7, 0)).status, SlotStatus::Postponed);
        assert!(h.state.is_dirty());
        let saved = h.store.inner.saved().unwrap();
        assert_eq!(
            saved.slot(&SlotId::from_start(&t(7, 0))).unwrap().status,
            SlotStatus::Pending
        );

        h.store.fail.store(false, Ordering::SeqCst);
        h.clock.advance(Duration::minutes(1));
        h.trigger.scan().await;

        assert!(!h.state.is_dirty());
        let saved = h.store.inner.saved().unwrap();
        assert_eq!(
            saved.slot(&SlotId::from_start(&t(7, 0))).unwrap().status,
            SlotStatus::Postponed
        );
        assert_eq!(h.model.calls(), 1);
    }

    #[tokio::test]
    async fn test_find_next_checks_nearest_upcoming_slot() {
        let config = SchedulerConfig {
            find_next: true,
            ..SchedulerConfig::default()
        };
        let h = Harness::with_config(
            schedule_with_slots(&[t(17, 0), t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            50.0,
            t(3, 0),
            config,
        )
        .await;

        let due = h.trigger.preview().unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].slot_id, SlotId::from_start(&t(7, 0)));

        let report = h.trigger.scan().await;
        assert_eq!(report.checked, 1);
        assert_eq!(h.slot(t(17, 0)).status, SlotStatus::Pending);
    }

    #[tokio::test]
    async fn test_nothing_due_outside_window() {
        let h = Harness::new(
            schedule_with_slots(&[t(7, 0)]),
            ScriptedModel::always(Script::Probability(0.9)),
            50.0,
            t(3, 0),
        )
        .await;
        let report = h.trigger.scan().await;
        assert_eq!(report, Default::default());
        assert_eq!(h.model.calls(), 0);
    }

    /// Model that swaps in a new schedule while it is being asked
    struct RegeneratingModel {
        state: Arc<ScheduleState>,
    }

    #[async_trait]
    impl ForecastModel for RegeneratingModel {
        async fn predict(&self, _features: &FeatureVector) -> AppResult<ModelPrediction> {
            self.state.replace(schedule_with_slots(&[t(17, 0)]));
            Ok(ModelPrediction {
                probability: 0.9,
                amount_mm: None,
            })
        }

        fn name(&self) -> &str {
            "regenerating"
        }
    }

    #[tokio::test]
    async fn test_regeneration_during_check_drops_result() {
        let now = t(6, 45);
        let store = Arc::new(FlakyStore::default());
        let state = Arc::new(ScheduleState::new(store, std::time::Duration::from_secs(1)));
        state.replace(schedule_with_slots(&[t(7, 0)]));

        let clock = Arc::new(irrigation_backend::services::ManualClock::new(now));
        let publisher = Arc::new(RecordingPublisher::default());
        let trigger = irrigation_backend::services::TriggerScheduler::new(
            state.clone(),
            engine(
                filled_window(now, 50.0),
                Arc::new(RegeneratingModel {
                    state: state.clone(),
                }),
            ),
            publisher.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        );

        let outcome = trigger
            .check_slot(&SlotId::from_start(&t(7, 0)))
            .await
            .unwrap();
        assert_eq!(outcome, SlotCheck::Superseded);

        let current = state.current().unwrap();
        assert_eq!(current.slots.len(), 1);
        assert!(current
            .slots
            .iter()
            .all(|s| s.status == SlotStatus::Pending));
        assert_eq!(publisher.decision_count(), 0);
        assert_eq!(clock.now(), now);
    }
}
