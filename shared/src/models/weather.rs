//! Weather rows and daily forecast aggregates

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Hourly weather snapshot from the weather API, history or forecast.
///
/// Field names follow the weather CSV columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRow {
    #[serde(rename = "ts", with = "crate::types::utc_z")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_temp")]
    pub api_temp_c: f64,
    #[serde(default = "default_rh")]
    pub api_rh_pct: f64,
    #[serde(default)]
    pub api_pressure_hpa: Option<f64>,
    #[serde(default = "default_uvi")]
    pub api_uvi: f64,
    #[serde(default)]
    pub api_weather_code: u16,
    #[serde(default)]
    pub api_rain_1h: f64,
    #[serde(default = "default_pop")]
    pub api_pop: f64,
}

fn default_temp() -> f64 {
    25.0
}

fn default_rh() -> f64 {
    70.0
}

fn default_uvi() -> f64 {
    5.0
}

fn default_pop() -> f64 {
    0.2
}

impl WeatherRow {
    /// Fallback row used when nothing is known near `timestamp`
    pub fn defaults_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            api_temp_c: default_temp(),
            api_rh_pct: default_rh(),
            api_pressure_hpa: None,
            api_uvi: default_uvi(),
            api_weather_code: 0,
            api_rain_1h: 0.0,
            api_pop: default_pop(),
        }
    }
}

/// Weather codes in `[start, end]` are treated as fog / high humidity
/// rather than rain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherCodeBand {
    pub start: u16,
    pub end: u16,
}

impl WeatherCodeBand {
    pub fn contains(&self, code: u16) -> bool {
        (self.start..=self.end).contains(&code)
    }
}

impl Default for WeatherCodeBand {
    fn default() -> Self {
        Self { start: 700, end: 799 }
    }
}

/// One day of aggregated forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    /// Summed rainfall (mm)
    pub rain_mm: f64,
    /// Highest precipitation probability seen during the day
    pub pop_max: f64,
    /// Most frequent weather code of the day
    pub weather_code_main: u16,
}

impl DailyForecast {
    pub fn dry(date: NaiveDate) -> Self {
        Self {
            date,
            rain_mm: 0.0,
            pop_max: 0.0,
            weather_code_main: 0,
        }
    }
}

/// Aggregate hourly rows into one record per calendar day (UTC), ordered by date.
///
/// Ties for the dominant weather code go to the smallest code.
pub fn aggregate_daily(rows: &[WeatherRow]) -> Vec<DailyForecast> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&WeatherRow>> = BTreeMap::new();
    for row in rows {
        by_day.entry(row.timestamp.date_naive()).or_default().push(row);
    }

    by_day
        .into_iter()
        .map(|(date, rows)| {
            let rain_mm = rows.iter().map(|r| r.api_rain_1h.max(0.0)).sum();
            let pop_max = rows.iter().map(|r| r.api_pop).fold(0.0, f64::max);

            let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
            for r in &rows {
                *counts.entry(r.api_weather_code).or_default() += 1;
            }
            let weather_code_main = counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(code, _)| *code)
                .unwrap_or(0);

            DailyForecast {
                date,
                rain_mm,
                pop_max,
                weather_code_main,
            }
        })
        .collect()
}
