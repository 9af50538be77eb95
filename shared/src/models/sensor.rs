//! Sensor readings and inbound sensor events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Device id used when an inbound event does not name one
pub const UNKNOWN_DEVICE: &str = "unknown";

/// One environmental reading from a field device.
///
/// Field names follow the sensor history CSV so records load straight from
/// disk and serialize back in the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "ts", with = "crate::types::utc_z")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "unknown_device")]
    pub device_id: String,
    #[serde(rename = "temp_c")]
    pub temperature: f64,
    #[serde(rename = "rh_pct")]
    pub humidity: f64,
    #[serde(rename = "pressure_hpa")]
    pub pressure: f64,
    #[serde(rename = "soil_moist_pct")]
    pub soil_moisture: f64,
    #[serde(default)]
    pub rain_mm_5min: f64,
}

fn unknown_device() -> String {
    UNKNOWN_DEVICE.to_string()
}

/// Sensor event as pushed by a device over the broker or HTTP
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorEvent {
    #[validate(range(min = -40.0, max = 85.0))]
    pub temperature: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub humidity: f64,

    #[validate(range(min = 300.0, max = 1100.0))]
    pub pressure: f64,

    #[serde(rename = "soilMoisture", alias = "soil_moisture")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub soil_moisture: f64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub rain_mm_5min: Option<f64>,

    #[serde(default, with = "crate::types::utc_z::option")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub device_id: Option<String>,
}

impl SensorEvent {
    /// A device that lost its sensors reports zero for temperature,
    /// humidity and soil moisture at once.
    pub fn is_dropout(&self) -> bool {
        self.temperature == 0.0 && self.humidity == 0.0 && self.soil_moisture == 0.0
    }

    /// Convert into a reading, stamping it with `received_at` when the
    /// device sent no timestamp.
    pub fn into_reading(self, received_at: DateTime<Utc>) -> SensorReading {
        SensorReading {
            timestamp: self.timestamp.unwrap_or(received_at),
            device_id: self
                .device_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(unknown_device),
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            soil_moisture: self.soil_moisture,
            rain_mm_5min: self.rain_mm_5min.unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> SensorEvent {
        serde_json::from_str(
            r#"{"temperature": 27.4, "humidity": 81.0, "pressure": 1006.2, "soilMoisture": 36.5}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_event_defaults_timestamp_and_device() {
        let received = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let reading = event().into_reading(received);
        assert_eq!(reading.timestamp, received);
        assert_eq!(reading.device_id, UNKNOWN_DEVICE);
        assert_eq!(reading.rain_mm_5min, 0.0);
        assert_eq!(reading.soil_moisture, 36.5);
    }

    #[test]
    fn test_event_keeps_device_timestamp() {
        let raw = r#"{"temperature": 27.4, "humidity": 81.0, "pressure": 1006.2,
            "soilMoisture": 36.5, "timestamp": "2025-06-01T07:55:00", "device_id": "esp32-01"}"#;
        let event: SensorEvent = serde_json::from_str(raw).unwrap();
        let reading = event.into_reading(Utc::now());
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2025, 6, 1, 7, 55, 0).unwrap());
        assert_eq!(reading.device_id, "esp32-01");
    }

    #[test]
    fn test_dropout_detection() {
        let mut e = event();
        assert!(!e.is_dropout());
        e.temperature = 0.0;
        e.humidity = 0.0;
        assert!(!e.is_dropout());
        e.soil_moisture = 0.0;
        assert!(e.is_dropout());
    }

    #[test]
    fn test_event_validation_ranges() {
        assert!(event().validate().is_ok());

        let mut e = event();
        e.humidity = 140.0;
        assert!(e.validate().is_err());

        let mut e = event();
        e.rain_mm_5min = Some(-1.0);
        assert!(e.validate().is_err());

        let mut e = event();
        e.temperature = 120.0;
        assert!(e.validate().is_err());
    }
}
