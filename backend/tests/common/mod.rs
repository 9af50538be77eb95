//! Fakes and fixtures shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use irrigation_backend::config::{Config, PlannerConfig, SchedulerConfig};
use irrigation_backend::external::{ForecastModel, ModelPrediction, Publisher};
use irrigation_backend::services::{
    Clock, DataSource, DecisionEngine, FeatureExtractor, IngestService, ManualClock, MemoryStore,
    NowcastService, PlanBuilder, ScheduleService, ScheduleState, ScheduleStore, SensorWindow,
    SharedWindow, TriggerScheduler, WeatherSource,
};
use irrigation_backend::{AppError, AppResult, AppState};
use parking_lot::Mutex;
use shared::{
    DecisionEvent, DecisionThresholds, FeatureVector, HorizonGroup, Schedule, ScheduleMeta,
    SensorReading, Slot, SlotBook, SlotStatus, WaterBalance,
};

// ============================================================================
// Time
// ============================================================================

/// 2025-06-03 at `h:m` UTC
pub fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 3, h, m, 0).unwrap()
}

// ============================================================================
// Fake ports
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Script {
    Probability(f64),
    Fail,
    /// Returned as-is, whatever the value
    Raw(f64),
}

/// Model answering from a script; the last entry repeats
pub struct ScriptedModel {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: Script) -> Self {
        Self::new(vec![step])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Script {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            *script.front().unwrap()
        }
    }
}

#[async_trait]
impl ForecastModel for ScriptedModel {
    async fn predict(&self, _features: &FeatureVector) -> AppResult<ModelPrediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next() {
            Script::Probability(p) => Ok(ModelPrediction {
                probability: p,
                amount_mm: Some(1.2),
            }),
            Script::Fail => Err(AppError::ModelInference("scripted failure".into())),
            Script::Raw(p) => Ok(ModelPrediction {
                probability: p,
                amount_mm: None,
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub decisions: Mutex<Vec<DecisionEvent>>,
    pub schedules: Mutex<Vec<Schedule>>,
    pub fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn decision_count(&self) -> usize {
        self.decisions.lock().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish_decision(&self, event: &DecisionEvent) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Publish("broker down".into()));
        }
        self.decisions.lock().push(event.clone());
        Ok(())
    }

    async fn publish_schedule(&self, schedule: &Schedule) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Publish("broker down".into()));
        }
        self.schedules.lock().push(schedule.clone());
        Ok(())
    }
}

/// Store that can be switched to failing
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail: AtomicBool,
}

#[async_trait]
impl ScheduleStore for FlakyStore {
    async fn load(&self) -> AppResult<Option<Schedule>> {
        self.inner.load().await
    }

    async fn save(&self, schedule: &Schedule) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("disk full".into()));
        }
        self.inner.save(schedule).await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn reading(at: DateTime<Utc>, soil: f64) -> SensorReading {
    SensorReading {
        timestamp: at,
        device_id: "esp32-01".to_string(),
        temperature: 28.5,
        humidity: 78.0,
        pressure: 1007.5,
        soil_moisture: soil,
        rain_mm_5min: 0.0,
    }
}

/// Twelve readings at 5-minute steps ending at `last`
pub fn filled_window(last: DateTime<Utc>, soil: f64) -> SharedWindow {
    let mut window = SensorWindow::new(24, 12, 12);
    for i in (0..12).rev() {
        window
            .push(reading(last - Duration::minutes(5 * i), soil))
            .unwrap();
    }
    window.shared()
}

/// Readings at the given times only
pub fn sparse_window(times: &[DateTime<Utc>], soil: f64) -> SharedWindow {
    let mut window = SensorWindow::new(24, 12, 12);
    for at in times {
        window.push(reading(*at, soil)).unwrap();
    }
    window.shared()
}

pub fn pending_slot(start: DateTime<Utc>, lead_minutes: i64) -> Slot {
    Slot {
        start_ts: start,
        end_ts: start + Duration::minutes(15),
        device_id: "esp32-01".to_string(),
        duration_min: 15,
        rain_mm_day: 0.0,
        soil_moist_ref: 35.0,
        date: start.date_naive(),
        horizon_group: HorizonGroup::Days1To2,
        season: "summer_fast_reaction".to_string(),
        forecast_trigger_ts: Some(start - Duration::minutes(lead_minutes)),
        status: SlotStatus::Pending,
        forecast_result: None,
        forecast_checked_at: None,
    }
}

/// Schedule holding only pending slots at `starts`, lead 10 minutes
pub fn schedule_with_slots(starts: &[DateTime<Utc>]) -> Schedule {
    Schedule {
        generated_at: t(0, 0),
        location: Default::default(),
        mode: "test".to_string(),
        summary: Default::default(),
        meta: ScheduleMeta {
            lead_minutes: 10,
            ..Default::default()
        },
        water_balance: WaterBalance::compute(&[], 70.0, 0.4),
        days_detail: Vec::new(),
        slots: SlotBook::from(
            starts
                .iter()
                .map(|s| pending_slot(*s, 10))
                .collect::<Vec<_>>(),
        ),
    }
}

pub fn engine(window: SharedWindow, model: Arc<dyn ForecastModel>) -> Arc<DecisionEngine> {
    Arc::new(DecisionEngine::new(
        window,
        Arc::new(WeatherSource::empty(Duration::minutes(60))),
        FeatureExtractor::new(3, 12, 1),
        model,
        DecisionThresholds::default(),
        StdDuration::from_secs(1),
    ))
}

/// Trigger scheduler wired to fakes
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub model: Arc<ScriptedModel>,
    pub publisher: Arc<RecordingPublisher>,
    pub store: Arc<FlakyStore>,
    pub state: Arc<ScheduleState>,
    pub trigger: TriggerScheduler,
}

impl Harness {
    pub async fn new(
        schedule: Schedule,
        model: ScriptedModel,
        soil: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_config(schedule, model, soil, now, SchedulerConfig::default()).await
    }

    /// The schedule starts out saved, so nothing is dirty
    pub async fn with_config(
        schedule: Schedule,
        model: ScriptedModel,
        soil: f64,
        now: DateTime<Utc>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_window(schedule, model, filled_window(now, soil), now, config).await
    }

    pub async fn with_window(
        schedule: Schedule,
        model: ScriptedModel,
        window: SharedWindow,
        now: DateTime<Utc>,
        config: SchedulerConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let model = Arc::new(model);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::with_schedule(schedule),
            fail: AtomicBool::new(false),
        });
        let state = Arc::new(ScheduleState::new(store.clone(), StdDuration::from_secs(1)));
        state.restore().await.unwrap();

        let trigger = TriggerScheduler::new(
            state.clone(),
            engine(window, model.clone()),
            publisher.clone(),
            clock.clone(),
            config,
        );

        Self {
            clock,
            model,
            publisher,
            store,
            state,
            trigger,
        }
    }

    pub fn slot(&self, start: DateTime<Utc>) -> Slot {
        let schedule = self.state.current().unwrap();
        schedule
            .slot(&shared::SlotId::from_start(&start))
            .unwrap()
            .clone()
    }
}

/// Full application state over fakes, with an empty window and no schedule
pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub publisher: Arc<RecordingPublisher>,
    pub state: AppState,
}

pub fn test_app(now: DateTime<Utc>) -> TestApp {
    let config = Config::default();
    let clock = Arc::new(ManualClock::new(now));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let publisher = Arc::new(RecordingPublisher::default());
    let window = SensorWindow::new(24, 12, 12).shared();
    let weather = Arc::new(WeatherSource::empty(Duration::minutes(60)));
    let model = Arc::new(ScriptedModel::always(Script::Probability(0.2)));

    let engine = Arc::new(DecisionEngine::new(
        window.clone(),
        weather.clone(),
        FeatureExtractor::new(3, 12, 1),
        model,
        DecisionThresholds::default(),
        StdDuration::from_secs(1),
    ));
    let nowcast = Arc::new(NowcastService::new(
        engine.clone(),
        publisher.clone(),
        StdDuration::from_secs(1),
    ));
    let ingest = Arc::new(IngestService::new(window.clone(), nowcast.clone(), dyn_clock.clone()));
    let schedule_state = Arc::new(ScheduleState::new(
        Arc::new(MemoryStore::new()),
        StdDuration::from_secs(1),
    ));
    let schedules = Arc::new(ScheduleService::new(
        schedule_state.clone(),
        PlanBuilder::new(PlannerConfig::default()).unwrap(),
        DataSource::default(),
        weather,
        window.clone(),
        publisher.clone(),
        dyn_clock.clone(),
        StdDuration::from_secs(1),
        Duration::minutes(1),
    ));
    let trigger = Arc::new(TriggerScheduler::new(
        schedule_state,
        engine.clone(),
        publisher.clone(),
        dyn_clock,
        config.scheduler.clone(),
    ));

    TestApp {
        clock,
        publisher,
        state: AppState {
            config: Arc::new(config),
            window,
            engine,
            nowcast,
            ingest,
            schedules,
            trigger,
        },
    }
}
