//! Time-indexed weather rows used as the API side of feature fusion

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use shared::WeatherRow;

use crate::error::{AppError, AppResult};

/// Weather rows shared between the refresh task and readers
pub type SharedWeather = Arc<WeatherSource>;

#[derive(Debug)]
pub struct WeatherSource {
    rows: RwLock<Vec<WeatherRow>>,
    tolerance: Duration,
}

impl WeatherSource {
    pub fn new(mut rows: Vec<WeatherRow>, tolerance: Duration) -> Self {
        rows.sort_by_key(|r| r.timestamp);
        rows.dedup_by_key(|r| r.timestamp);
        Self {
            rows: RwLock::new(rows),
            tolerance,
        }
    }

    pub fn empty(tolerance: Duration) -> Self {
        Self::new(Vec::new(), tolerance)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// The row nearest to `at`, if one lies within the tolerance
    pub fn row_at(&self, at: DateTime<Utc>) -> AppResult<WeatherRow> {
        let rows = self.rows.read();
        let idx = rows.partition_point(|r| r.timestamp < at);

        let before = idx.checked_sub(1).and_then(|i| rows.get(i));
        let after = rows.get(idx);
        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (at - b.timestamp) <= (a.timestamp - at) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        };

        nearest
            .filter(|r| (r.timestamp - at).num_seconds().abs() <= self.tolerance.num_seconds())
            .cloned()
            .ok_or_else(|| AppError::StaleReference(at.to_rfc3339()))
    }

    /// Nearest row, or the fixed defaults when nothing is close enough
    pub fn row_or_default(&self, at: DateTime<Utc>) -> WeatherRow {
        match self.row_at(at) {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(as_of = %at, "{}; using default weather values", err);
                WeatherRow::defaults_at(at)
            }
        }
    }

    /// Insert rows, replacing any with the same timestamp
    pub fn merge(&self, incoming: Vec<WeatherRow>) -> usize {
        let count = incoming.len();
        let mut rows = self.rows.write();
        for row in incoming {
            match rows.binary_search_by_key(&row.timestamp, |r| r.timestamp) {
                Ok(i) => rows[i] = row,
                Err(i) => rows.insert(i, row),
            }
        }
        count
    }

    /// Rows with `from <= ts < until`
    pub fn range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<WeatherRow> {
        self.rows
            .read()
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp < until)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, hour, minute, 0).unwrap()
    }

    fn row(hour: u32, pop: f64) -> WeatherRow {
        WeatherRow {
            api_pop: pop,
            ..WeatherRow::defaults_at(at(hour, 0))
        }
    }

    fn source() -> WeatherSource {
        WeatherSource::new(vec![row(9, 0.9), row(6, 0.6), row(7, 0.7)], Duration::minutes(60))
    }

    #[test]
    fn test_nearest_row_within_tolerance() {
        let s = source();
        assert_eq!(s.row_at(at(6, 20)).unwrap().api_pop, 0.6);
        assert_eq!(s.row_at(at(6, 40)).unwrap().api_pop, 0.7);
        assert_eq!(s.row_at(at(8, 10)).unwrap().api_pop, 0.9);
        assert_eq!(s.row_at(at(10, 0)).unwrap().api_pop, 0.9);
    }

    #[test]
    fn test_stale_reference_falls_back_to_defaults() {
        let s = source();
        assert!(matches!(s.row_at(at(11, 30)), Err(AppError::StaleReference(_))));
        let fallback = s.row_or_default(at(11, 30));
        assert_eq!(fallback.api_pop, 0.2);
        assert_eq!(fallback.api_temp_c, 25.0);
        assert_eq!(fallback.api_rh_pct, 70.0);
        assert_eq!(fallback.api_uvi, 5.0);
        assert_eq!(fallback.api_rain_1h, 0.0);
    }

    #[test]
    fn test_merge_replaces_and_inserts() {
        let s = source();
        s.merge(vec![row(7, 0.1), row(8, 0.8)]);
        assert_eq!(s.len(), 4);
        assert_eq!(s.row_at(at(7, 0)).unwrap().api_pop, 0.1);
        assert_eq!(s.row_at(at(8, 0)).unwrap().api_pop, 0.8);
    }

    #[test]
    fn test_empty_source_is_stale() {
        let s = WeatherSource::empty(Duration::minutes(60));
        assert!(s.row_at(at(7, 0)).is_err());
    }
}
