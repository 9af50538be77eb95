//! Common types used across the agent

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Farm location the plan is generated for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl Default for Location {
    fn default() -> Self {
        // Hanoi
        Self {
            lat: 21.0245,
            lon: 105.8412,
        }
    }
}

/// Round to two decimal places, the precision used in persisted reports
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format a UTC timestamp as ISO-8601 with an explicit `Z` suffix
pub fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Offsets are honoured; naive timestamps (with `T` or a space separator,
/// optional fractional seconds) are taken as UTC.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `DateTime<Utc>` using the canonical `Z` encoding
pub mod utc_z {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_utc(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    /// Same encoding for optional timestamps
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::super::format_utc(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => super::super::parse_utc(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_format_has_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 3, 7, 0, 0).unwrap();
        assert_eq!(format_utc(&ts), "2025-06-03T07:00:00Z");
    }

    #[test]
    fn test_parse_accepts_naive_and_offset_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 3, 7, 0, 0).unwrap();
        assert_eq!(parse_utc("2025-06-03T07:00:00Z"), Some(expected));
        assert_eq!(parse_utc("2025-06-03T07:00:00"), Some(expected));
        assert_eq!(parse_utc("2025-06-03 07:00:00"), Some(expected));
        assert_eq!(parse_utc("2025-06-03T14:00:00+07:00"), Some(expected));
        assert_eq!(parse_utc("yesterday"), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(-0.004), -0.0);
    }

    proptest! {
        #[test]
        fn prop_format_then_parse_is_lossless(
            secs in 946_684_800i64..4_102_444_800i64,
            millis in 0u32..1000,
        ) {
            let ts = Utc.timestamp_opt(secs, millis * 1_000_000).unwrap();
            let text = format_utc(&ts);
            prop_assert!(text.ends_with('Z'));
            prop_assert_eq!(parse_utc(&text), Some(ts));
        }
    }
}
