//! Bounded, time-ordered buffer of the most recent sensor readings
//!
//! Only the ingestion path writes to the window; the trigger scan and the
//! HTTP handlers take snapshots through the shared read lock.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::SensorReading;

use crate::config::WindowConfig;
use crate::error::{AppError, AppResult};

/// Window shared between the ingestion path and readers
pub type SharedWindow = Arc<RwLock<SensorWindow>>;

/// Fewest readings features can be derived from
pub const MIN_READINGS: usize = 2;

/// What a successful push did to the window
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Appended,
    /// Same timestamp as the newest reading, which was overwritten
    Replaced,
    /// Appended at capacity; the oldest reading was dropped
    Evicted(SensorReading),
}

#[derive(Debug, Clone)]
pub struct SensorWindow {
    readings: VecDeque<SensorReading>,
    capacity: usize,
    ready_at: usize,
    lookback: usize,
}

impl SensorWindow {
    pub fn new(capacity: usize, ready_at: usize, lookback: usize) -> Self {
        let capacity = capacity.max(MIN_READINGS);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            ready_at: ready_at.min(capacity),
            lookback: lookback.clamp(MIN_READINGS, capacity),
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.capacity, config.ready_at, config.steps_per_hour)
    }

    pub fn shared(self) -> SharedWindow {
        Arc::new(RwLock::new(self))
    }

    /// Append a reading, evicting the oldest at capacity.
    ///
    /// A reading older than the newest one is rejected so the window stays
    /// strictly time-ordered; an equal timestamp replaces the newest entry.
    pub fn push(&mut self, reading: SensorReading) -> AppResult<PushOutcome> {
        if let Some(newest) = self.readings.back_mut() {
            if reading.timestamp < newest.timestamp {
                return Err(AppError::OutOfOrder(format!(
                    "{} is before {}",
                    reading.timestamp, newest.timestamp
                )));
            }
            if reading.timestamp == newest.timestamp {
                *newest = reading;
                return Ok(PushOutcome::Replaced);
            }
        }

        let evicted = if self.readings.len() == self.capacity {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);

        Ok(match evicted {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Appended,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.readings.len() >= self.ready_at
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ready_at(&self) -> usize {
        self.ready_at
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter()
    }

    /// All readings, oldest first
    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.readings.iter().cloned().collect()
    }

    /// The most recent readings at or before `at`, for as-of features.
    ///
    /// When nothing predates `at` the most recent readings are used instead.
    /// Fails when fewer than two readings remain after the cut.
    pub fn snapshot_before(&self, at: DateTime<Utc>) -> AppResult<Vec<SensorReading>> {
        if self.readings.is_empty() {
            return Err(AppError::InsufficientData(format!(
                "0 reading(s) in window, need {}",
                MIN_READINGS
            )));
        }

        let upto = self.readings.partition_point(|r| r.timestamp <= at);
        let end = if upto == 0 {
            tracing::warn!(
                as_of = %at,
                oldest = %self.readings[0].timestamp,
                "no readings before as-of time, using most recent"
            );
            self.readings.len()
        } else {
            upto
        };
        let start = end.saturating_sub(self.lookback);
        if end - start < MIN_READINGS {
            return Err(AppError::InsufficientData(format!(
                "{} reading(s) at or before {}, need {}",
                end - start,
                at,
                MIN_READINGS
            )));
        }

        Ok(self.readings.range(start..end).cloned().collect())
    }
}

impl Default for SensorWindow {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn reading(minute: i64, soil: f64) -> SensorReading {
        SensorReading {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 3, 6, 0, 0).unwrap() + Duration::minutes(minute),
            device_id: "esp32-01".to_string(),
            temperature: 28.0,
            humidity: 75.0,
            pressure: 1008.0,
            soil_moisture: soil,
            rain_mm_5min: 0.0,
        }
    }

    #[test]
    fn test_push_evicts_oldest_at_capacity() {
        let mut window = SensorWindow::new(3, 2, 3);
        for i in 0..3 {
            assert_eq!(window.push(reading(i * 5, 30.0)).unwrap(), PushOutcome::Appended);
        }
        let outcome = window.push(reading(15, 31.0)).unwrap();
        assert_eq!(outcome, PushOutcome::Evicted(reading(0, 30.0)));
        assert_eq!(window.len(), 3);
        assert_eq!(window.snapshot()[0].timestamp, reading(5, 0.0).timestamp);
    }

    #[test]
    fn test_out_of_order_rejected_and_equal_replaces() {
        let mut window = SensorWindow::default();
        window.push(reading(10, 30.0)).unwrap();
        assert!(matches!(window.push(reading(5, 30.0)), Err(AppError::OutOfOrder(_))));
        assert_eq!(window.push(reading(10, 33.0)).unwrap(), PushOutcome::Replaced);
        assert_eq!(window.len(), 1);
        assert_eq!(window.latest().unwrap().soil_moisture, 33.0);
    }

    #[test]
    fn test_ready_threshold() {
        let mut window = SensorWindow::default();
        for i in 0..11 {
            window.push(reading(i * 5, 30.0)).unwrap();
            assert!(!window.is_ready());
        }
        window.push(reading(55, 30.0)).unwrap();
        assert!(window.is_ready());
    }

    #[test]
    fn test_snapshot_before_limits_to_lookback_and_as_of() {
        let mut window = SensorWindow::default();
        for i in 0..24 {
            window.push(reading(i * 5, i as f64)).unwrap();
        }
        let at = reading(60, 0.0).timestamp;
        let snap = window.snapshot_before(at).unwrap();
        assert_eq!(snap.len(), 12);
        assert_eq!(snap.last().unwrap().timestamp, at);
        assert_eq!(snap.first().unwrap().timestamp, reading(5, 0.0).timestamp);
    }

    #[test]
    fn test_snapshot_before_falls_back_to_latest() {
        let mut window = SensorWindow::default();
        for i in 0..5 {
            window.push(reading(i * 5, i as f64)).unwrap();
        }
        let snap = window.snapshot_before(reading(-60, 0.0).timestamp).unwrap();
        assert_eq!(snap.len(), 5);
        assert_eq!(snap.last().unwrap().soil_moisture, 4.0);
    }

    #[test]
    fn test_snapshot_before_needs_two_readings() {
        let mut window = SensorWindow::default();
        window.push(reading(0, 30.0)).unwrap();
        assert!(matches!(
            window.snapshot_before(reading(5, 0.0).timestamp),
            Err(AppError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_snapshot_before_counts_only_readings_up_to_as_of() {
        let mut window = SensorWindow::default();
        for minute in [0, 90, 95] {
            window.push(reading(minute, 30.0)).unwrap();
        }
        assert!(matches!(
            window.snapshot_before(reading(50, 0.0).timestamp),
            Err(AppError::InsufficientData(_))
        ));
        assert_eq!(
            window.snapshot_before(reading(95, 0.0).timestamp).unwrap().len(),
            3
        );
    }
}
