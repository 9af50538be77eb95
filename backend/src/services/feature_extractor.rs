//! Feature extraction from a sensor window snapshot and a weather row
//!
//! Lags are expressed in readings, not minutes, so the same code serves any
//! cadence: at 5-minute cadence one hour is 12 readings and 15 minutes is 3.

use chrono::{DateTime, Datelike, Timelike, Utc};
use shared::{cyclical, dew_point, FeatureVector, SensorReading, WeatherRow};

use crate::config::WindowConfig;

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    steps_per_15m: usize,
    steps_per_hour: usize,
    soil_smoothing_steps: usize,
}

impl FeatureExtractor {
    pub fn new(steps_per_15m: usize, steps_per_hour: usize, soil_smoothing_steps: usize) -> Self {
        Self {
            steps_per_15m: steps_per_15m.max(1),
            steps_per_hour: steps_per_hour.max(1),
            soil_smoothing_steps: soil_smoothing_steps.max(1),
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(
            config.steps_per_15m,
            config.steps_per_hour,
            config.soil_smoothing_steps,
        )
    }

    /// Derive the feature vector from readings sorted oldest first.
    ///
    /// With fewer than two readings a degenerate vector is returned: every
    /// derived value is zero, soil moisture is the last known value and the
    /// calendar encodings use the last timestamp, or `now` if there is none.
    pub fn extract(
        &self,
        readings: &[SensorReading],
        weather: &WeatherRow,
        now: DateTime<Utc>,
    ) -> FeatureVector {
        let (first, last) = match (readings.first(), readings.last()) {
            (Some(first), Some(last)) if readings.len() >= 2 => (first, last),
            _ => return Self::degenerate(readings.last(), now),
        };
        let n = readings.len();

        let hour_ago = if n >= self.steps_per_hour {
            &readings[n - self.steps_per_hour]
        } else {
            first
        };
        let quarter_ago = if n >= self.steps_per_15m {
            &readings[n - self.steps_per_15m]
        } else {
            first
        };

        let smoothing = self.soil_smoothing_steps.min(n);
        let soil_moist_smooth = readings[n - smoothing..]
            .iter()
            .map(|r| r.soil_moisture)
            .sum::<f64>()
            / smoothing as f64;

        let dew_sensor = dew_point(last.temperature, last.humidity);
        let dew_api = dew_point(weather.api_temp_c, weather.api_rh_pct);

        let (month_sin, month_cos, hour_sin, hour_cos) = calendar_encoding(last.timestamp);

        FeatureVector {
            api_pop: weather.api_pop,
            api_rain_1h: weather.api_rain_1h,
            pressure_slope_1h: last.pressure - hour_ago.pressure,
            temp_drop_15m: quarter_ago.temperature - last.temperature,
            rh_rise_15m: last.humidity - quarter_ago.humidity,
            dew_point_diff: dew_sensor - dew_api,
            temp_bias: weather.api_temp_c - last.temperature,
            soil_moist_smooth,
            month_sin,
            month_cos,
            hour_sin,
            hour_cos,
            uvi_index: weather.api_uvi,
        }
    }

    fn degenerate(last: Option<&SensorReading>, now: DateTime<Utc>) -> FeatureVector {
        let at = last.map(|r| r.timestamp).unwrap_or(now);
        let (month_sin, month_cos, hour_sin, hour_cos) = calendar_encoding(at);
        FeatureVector {
            soil_moist_smooth: last.map(|r| r.soil_moisture).unwrap_or(0.0),
            month_sin,
            month_cos,
            hour_sin,
            hour_cos,
            ..FeatureVector::default()
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}

fn calendar_encoding(at: DateTime<Utc>) -> (f64, f64, f64, f64) {
    let (month_sin, month_cos) = cyclical(at.month(), 12);
    let (hour_sin, hour_cos) = cyclical(at.hour(), 24);
    (month_sin, month_cos, hour_sin, hour_cos)
}
