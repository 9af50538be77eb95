//! Configuration management for the irrigation agent
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with IRG_ prefix

use std::path::PathBuf;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{
    validate_thresholds, validate_window_sizes, DecisionThresholds, Location, SeasonTable,
    WeatherCodeBand,
};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production, demo)
    pub environment: String,

    /// HTTP operations API
    pub server: ServerConfig,

    /// Message broker connection and topics
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Weather API and reference matching
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Forecast model adapter
    #[serde(default)]
    pub model: ModelConfig,

    /// Historical records and the persisted schedule
    #[serde(default)]
    pub data: DataConfig,

    /// Sensor window sizing and feature lags
    #[serde(default)]
    pub window: WindowConfig,

    /// Nowcast-time decision thresholds
    #[serde(default)]
    pub decision: DecisionThresholds,

    /// 7-day plan builder
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Slot trigger scan
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker at all; without it events are only logged
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Inbound sensor events
    pub sensor_topic: String,
    /// Outbound decision events
    pub forecast_topic: String,
    /// Outbound schedule events
    pub schedule_topic: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    /// Weather API endpoint
    pub api_endpoint: String,

    /// Weather API key; live refresh is off when empty
    pub api_key: String,

    /// Live refresh cadence
    pub refresh_minutes: u64,

    /// Maximum distance between a reading and its weather row
    pub reference_tolerance_minutes: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Logistic model from a local coefficients file
    Linear,
    /// Remote model-serving endpoint
    Http,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub coefficients_path: PathBuf,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Label threshold for the remote model; the linear model carries its own
    pub threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Real sensor history, preferred when present
    pub sensor_csv: PathBuf,
    /// Synthetic sensor history used when the real file is missing
    pub synthetic_sensor_csv: PathBuf,
    /// Hourly weather history
    pub weather_history_csv: PathBuf,
    /// Hourly forecast for the coming days, optional
    pub forecast_csv: PathBuf,
    /// Persisted schedule file
    pub schedule_path: PathBuf,
    /// Append every accepted live reading here when set
    pub sensor_archive_csv: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum readings held (24 = 120 minutes at 5-minute cadence)
    pub capacity: usize,
    /// Readings needed before nowcasts run (12 = 60 minutes)
    pub ready_at: usize,
    /// Readings spanning 15 minutes
    pub steps_per_15m: usize,
    /// Readings spanning one hour
    pub steps_per_hour: usize,
    /// Readings averaged for soil moisture smoothing
    pub soil_smoothing_steps: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minutes between the forecast check and the slot start
    pub lead_minutes: i64,
    /// Days planned ahead
    pub days: usize,
    /// Irrigation depth per minute of watering
    pub mm_per_min: f64,
    pub device_id: String,
    /// Soil reference used when history has no value for a day
    pub default_soil_moisture: f64,
    /// Minimum daily rain probability for a heavy-rain skip
    pub heavy_rain_probability: f64,
    /// Weather codes that never count as rain
    pub fog_band: WeatherCodeBand,
    pub morning_hour: u32,
    pub evening_hour: u32,
    /// Length of each of the two slots on critically dry days
    pub critical_duration_min: u32,
    /// Length of the single slot on moderately dry days
    pub low_duration_min: u32,
    /// Length of the catch-up slot on medium-rain days
    pub catch_up_duration_min: u32,
    /// Offset of farm local time from UTC; slot hours are local
    pub utc_offset_hours: i32,
    /// Regeneration cadence
    pub regenerate_hours: u64,
    pub location: Location,
    pub seasons: SeasonTable,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub scan_interval_secs: u64,
    /// How far ahead of a trigger time a slot becomes eligible
    pub lookahead_minutes: f64,
    /// How long after a trigger time a slot stays eligible
    pub grace_minutes: f64,
    /// When nothing is eligible, check the nearest upcoming slot instead
    pub find_next: bool,
    /// Upper bound for each model or publisher call
    pub port_timeout_secs: u64,
    /// Lead used when rebasing a schedule for a demo
    pub demo_lead_minutes: i64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("IRG_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("scheduler.find_next", environment == "demo")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (IRG_ prefix)
            .add_source(
                Environment::with_prefix("IRG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thresholds(&self.decision).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate_window_sizes(self.window.capacity, self.window.ready_at)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        if self.planner.days == 0 {
            return Err(ConfigError::Message("planner.days must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn is_demo(&self) -> bool {
        self.environment == "demo"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            mqtt: MqttConfig::default(),
            weather: WeatherConfig::default(),
            model: ModelConfig::default(),
            data: DataConfig::default(),
            window: WindowConfig::default(),
            decision: DecisionThresholds::default(),
            planner: PlannerConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "irrigation-agent".to_string(),
            keep_alive_secs: 30,
            sensor_topic: "sensor/data/push".to_string(),
            forecast_topic: "ai/forecast/rain".to_string(),
            schedule_topic: "ai/schedule/irrigation".to_string(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: String::new(),
            refresh_minutes: 30,
            reference_tolerance_minutes: 60,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Linear,
            coefficients_path: PathBuf::from("models/rain_nowcast.json"),
            endpoint: "http://localhost:8000/predict".to_string(),
            timeout_secs: 10,
            threshold: 0.5,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sensor_csv: PathBuf::from("data/sensor_raw_60d.csv"),
            synthetic_sensor_csv: PathBuf::from("data/synthetic_sensor_60d.csv"),
            weather_history_csv: PathBuf::from("data/owm_history_3y.csv"),
            forecast_csv: PathBuf::from("data/forecast_7d.csv"),
            schedule_path: PathBuf::from("data/irrigation_schedule.json"),
            sensor_archive_csv: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 24,
            ready_at: 12,
            steps_per_15m: 3,
            steps_per_hour: 12,
            soil_smoothing_steps: 1,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            lead_minutes: 10,
            days: 7,
            mm_per_min: 0.4,
            device_id: "esp32-01".to_string(),
            default_soil_moisture: 35.0,
            heavy_rain_probability: 0.6,
            fog_band: WeatherCodeBand::default(),
            morning_hour: 7,
            evening_hour: 17,
            critical_duration_min: 20,
            low_duration_min: 15,
            catch_up_duration_min: 10,
            utc_offset_hours: 0,
            regenerate_hours: 24,
            location: Location::default(),
            seasons: SeasonTable::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            lookahead_minutes: 15.0,
            grace_minutes: 5.0,
            find_next: false,
            port_timeout_secs: 10,
            demo_lead_minutes: 1,
        }
    }
}
