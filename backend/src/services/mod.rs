//! Services of the irrigation agent

pub mod clock;
pub mod data_source;
pub mod decision_engine;
pub mod feature_extractor;
pub mod ingest;
pub mod nowcast;
pub mod planner;
pub mod schedule_service;
pub mod schedule_state;
pub mod schedule_store;
pub mod sensor_window;
pub mod ticker;
pub mod trigger;
pub mod weather_source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use data_source::DataSource;
pub use decision_engine::DecisionEngine;
pub use feature_extractor::FeatureExtractor;
pub use ingest::{IngestOutcome, IngestService};
pub use nowcast::NowcastService;
pub use planner::PlanBuilder;
pub use schedule_service::{rebase_schedule, ScheduleService};
pub use schedule_state::ScheduleState;
pub use schedule_store::{JsonFileStore, MemoryStore, ScheduleStore};
pub use sensor_window::{SensorWindow, SharedWindow};
pub use ticker::PeriodicTask;
pub use trigger::{due_slots, DueReason, DueSlot, ScanReport, SlotCheck, TriggerScheduler};
pub use weather_source::{SharedWeather, WeatherSource};
