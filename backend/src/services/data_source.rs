//! Historical record files, resolved once at startup
//!
//! The sensor history prefers the real capture and falls back to the
//! synthetic one. The choice is made here and handed to whoever needs it.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use shared::{SensorReading, WeatherRow};

use crate::config::DataConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
pub struct DataSource {
    sensor: Option<PathBuf>,
    weather_history: Option<PathBuf>,
    forecast: Option<PathBuf>,
}

impl DataSource {
    pub fn resolve(config: &DataConfig) -> Self {
        let sensor = [&config.sensor_csv, &config.synthetic_sensor_csv]
            .into_iter()
            .find(|p| p.exists())
            .cloned();
        let weather_history = Some(config.weather_history_csv.clone()).filter(|p| p.exists());
        let forecast = Some(config.forecast_csv.clone()).filter(|p| p.exists());

        match &sensor {
            Some(path) => tracing::info!(path = %path.display(), "sensor history source"),
            None => tracing::warn!(
                real = %config.sensor_csv.display(),
                synthetic = %config.synthetic_sensor_csv.display(),
                "no sensor history found, soil references will use defaults"
            ),
        }
        match &forecast {
            Some(path) => tracing::info!(path = %path.display(), "hourly forecast source"),
            None => tracing::warn!("no forecast file, plan will use a pseudo-forecast from history"),
        }
        if weather_history.is_none() {
            tracing::warn!(path = %config.weather_history_csv.display(), "no weather history found");
        }

        Self {
            sensor,
            weather_history,
            forecast,
        }
    }

    /// Explicit paths, for tests and tools
    pub fn from_paths(
        sensor: Option<PathBuf>,
        weather_history: Option<PathBuf>,
        forecast: Option<PathBuf>,
    ) -> Self {
        Self {
            sensor,
            weather_history,
            forecast,
        }
    }

    pub fn sensor_label(&self) -> String {
        label(self.sensor.as_deref())
    }

    /// The forecast file when present, otherwise the history it falls back to
    pub fn weather_label(&self) -> String {
        label(self.forecast.as_deref().or(self.weather_history.as_deref()))
    }

    pub fn has_forecast(&self) -> bool {
        self.forecast.is_some()
    }

    /// Sensor history sorted by time; empty when no file was found
    pub fn load_sensor_history(&self) -> AppResult<Vec<SensorReading>> {
        let mut rows: Vec<SensorReading> = load_optional(self.sensor.as_deref())?;
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    pub fn load_weather_history(&self) -> AppResult<Vec<WeatherRow>> {
        let mut rows: Vec<WeatherRow> = load_optional(self.weather_history.as_deref())?;
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    pub fn load_forecast(&self) -> AppResult<Vec<WeatherRow>> {
        let mut rows: Vec<WeatherRow> = load_optional(self.forecast.as_deref())?;
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }
}

fn label(path: Option<&Path>) -> String {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "none".to_string())
}

fn load_optional<T: DeserializeOwned>(path: Option<&Path>) -> AppResult<Vec<T>> {
    match path {
        Some(path) => read_csv(path),
        None => Ok(Vec::new()),
    }
}

/// Read every record of a headed CSV file
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> AppResult<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::DataSource(format!("{}: {}", path.display(), e)))?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| AppError::DataSource(format!("{}: {}", path.display(), e)))
}

/// Append records to a CSV file, writing the header only for a new file
pub fn append_csv<T: Serialize>(path: &Path, records: &[T]) -> AppResult<()> {
    let exists = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::DataSource(format!("{}: {}", path.display(), e)))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(!exists)
        .from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::DataSource(format!("{}: {}", path.display(), e)))
}
