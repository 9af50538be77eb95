//! Model input features

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Number of features the forecast model consumes
pub const FEATURE_COUNT: usize = 13;

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "api_pop",
    "api_rain_1h",
    "pressure_slope_1h",
    "temp_drop_15m",
    "rh_rise_15m",
    "dew_point_diff",
    "temp_bias",
    "soil_moist_smooth",
    "month_sin",
    "month_cos",
    "hour_sin",
    "hour_cos",
    "uvi_index",
];

/// Fixed-order feature vector derived from the sensor window and one weather row
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub api_pop: f64,
    pub api_rain_1h: f64,
    pub pressure_slope_1h: f64,
    pub temp_drop_15m: f64,
    pub rh_rise_15m: f64,
    pub dew_point_diff: f64,
    pub temp_bias: f64,
    pub soil_moist_smooth: f64,
    pub month_sin: f64,
    pub month_cos: f64,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub uvi_index: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.api_pop,
            self.api_rain_1h,
            self.pressure_slope_1h,
            self.temp_drop_15m,
            self.rh_rise_15m,
            self.dew_point_diff,
            self.temp_bias,
            self.soil_moist_smooth,
            self.month_sin,
            self.month_cos,
            self.hour_sin,
            self.hour_cos,
            self.uvi_index,
        ]
    }

    pub fn names() -> &'static [&'static str] {
        &FEATURE_NAMES
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// Dew point (°C) by the Magnus approximation
pub fn dew_point(temp_c: f64, rh_pct: f64) -> f64 {
    let gamma = MAGNUS_A * temp_c / (MAGNUS_B + temp_c) + (rh_pct.max(1e-3) / 100.0).ln();
    MAGNUS_B * gamma / (MAGNUS_A - gamma)
}

/// `(sin, cos)` of `value` on a circle of `period`
pub fn cyclical(value: u32, period: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(value % period) / f64::from(period);
    (angle.sin(), angle.cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dew_point_saturated_air_equals_temperature() {
        assert!((dew_point(20.0, 100.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_dew_point_known_value() {
        // 30 °C at 70 % RH is roughly 23.9 °C
        let dp = dew_point(30.0, 70.0);
        assert!((dp - 23.9).abs() < 0.1, "dew point was {dp}");
    }

    #[test]
    fn test_dew_point_zero_humidity_is_finite() {
        assert!(dew_point(25.0, 0.0).is_finite());
    }

    #[test]
    fn test_cyclical_encoding() {
        let (s, c) = cyclical(6, 24);
        assert!((s - 1.0).abs() < 1e-12);
        assert!(c.abs() < 1e-12);

        // December wraps onto the same point as zero
        let (s, c) = cyclical(12, 12);
        assert!(s.abs() < 1e-12);
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_array_order_matches_names() {
        let v = FeatureVector {
            api_pop: 1.0,
            soil_moist_smooth: 8.0,
            uvi_index: 13.0,
            ..Default::default()
        };
        let arr = v.to_array();
        assert_eq!(arr[FEATURE_NAMES.iter().position(|n| *n == "api_pop").unwrap()], 1.0);
        assert_eq!(arr[FEATURE_NAMES.iter().position(|n| *n == "soil_moist_smooth").unwrap()], 8.0);
        assert_eq!(arr[FEATURE_COUNT - 1], 13.0);
    }
}
