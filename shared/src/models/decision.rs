//! Irrigation decision policy and forecast check payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::schedule::SlotId;

/// Thresholds for the nowcast-time irrigation decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Below this soil moisture (%) irrigation always proceeds
    pub critical_moisture: f64,
    /// Below this soil moisture (%) irrigation proceeds unless rain is likely
    pub low_moisture: f64,
    /// Rain probability under which "low moisture" irrigates
    pub low_rain_probability: f64,
    /// Rain probability above which irrigation is deferred
    pub high_rain_probability: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            critical_moisture: 30.0,
            low_moisture: 40.0,
            low_rain_probability: 0.4,
            high_rain_probability: 0.6,
        }
    }
}

/// Which policy rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    CriticalMoisture,
    LowMoistureLowRain,
    HighRainProbability,
    Adequate,
}

impl DecisionRule {
    pub fn should_irrigate(&self) -> bool {
        matches!(self, DecisionRule::CriticalMoisture | DecisionRule::LowMoistureLowRain)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            DecisionRule::CriticalMoisture => "critical moisture",
            DecisionRule::LowMoistureLowRain => "low moisture, low rain chance",
            DecisionRule::HighRainProbability => "high rain probability",
            DecisionRule::Adequate => "moisture adequate / rain moderate",
        }
    }

    pub fn reason_vi(&self) -> &'static str {
        match self {
            DecisionRule::CriticalMoisture => "độ ẩm đất rất thấp",
            DecisionRule::LowMoistureLowRain => "độ ẩm thấp, khả năng mưa thấp",
            DecisionRule::HighRainProbability => "khả năng mưa cao",
            DecisionRule::Adequate => "độ ẩm đủ / mưa vừa phải",
        }
    }
}

impl std::fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Outcome of the decision policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub should_irrigate: bool,
    pub reason: String,
    pub rule: DecisionRule,
}

impl DecisionThresholds {
    /// Evaluate the policy rules in priority order
    pub fn decide(&self, soil_moisture: f64, rain_probability: f64) -> Decision {
        let rule = if soil_moisture < self.critical_moisture {
            DecisionRule::CriticalMoisture
        } else if soil_moisture < self.low_moisture && rain_probability < self.low_rain_probability {
            DecisionRule::LowMoistureLowRain
        } else if rain_probability > self.high_rain_probability {
            DecisionRule::HighRainProbability
        } else {
            DecisionRule::Adequate
        };

        Decision {
            should_irrigate: rule.should_irrigate(),
            reason: rule.reason().to_string(),
            rule,
        }
    }
}

/// Decide with the default global thresholds
pub fn decide(soil_moisture: f64, rain_probability: f64) -> Decision {
    DecisionThresholds::default().decide(soil_moisture, rain_probability)
}

/// Confidence attached to a recommendation, by predicted label
pub fn confidence_for_label(label: u8) -> f64 {
    if label == 1 {
        0.9
    } else {
        0.85
    }
}

/// Model output for the next hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainPrediction {
    pub probability: f64,
    pub label: u8,
    pub amount_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub rain_60min: RainPrediction,
}

/// Sensor values the decision was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRef {
    pub soil_moist_pct: f64,
    pub temp_c: f64,
    pub rh_pct: f64,
    pub pressure_hpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub should_irrigate: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_vi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Result of one forecast check, stored on the slot and published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    #[serde(with = "crate::types::utc_z")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Predictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_ref: Option<SensorRef>,
    pub recommendation: Recommendation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForecastResult {
    /// Build a result from a model prediction and a policy decision
    pub fn from_decision(
        timestamp: DateTime<Utc>,
        prediction: RainPrediction,
        sensor_ref: SensorRef,
        decision: &Decision,
    ) -> Self {
        let confidence = confidence_for_label(prediction.label);
        Self {
            timestamp,
            predictions: Some(Predictions {
                rain_60min: prediction,
            }),
            sensor_ref: Some(sensor_ref),
            recommendation: Recommendation {
                should_irrigate: decision.should_irrigate,
                reason: decision.reason.clone(),
                reason_vi: Some(decision.rule.reason_vi().to_string()),
                confidence: Some(confidence),
            },
            error: None,
        }
    }

    /// Result recorded when the check itself failed: irrigate as planned
    pub fn fail_open(timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            timestamp,
            predictions: None,
            sensor_ref: None,
            recommendation: Recommendation {
                should_irrigate: true,
                reason: format!("forecast check failed ({error}); irrigating on schedule"),
                reason_vi: Some(format!("lỗi dự báo ({error}); tưới theo lịch mặc định")),
                confidence: None,
            },
            error: Some(error),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn probability(&self) -> Option<f64> {
        self.predictions.as_ref().map(|p| p.rain_60min.probability)
    }
}

/// Decision event published on the forecast topic.
///
/// `slot_id` is empty for live nowcasts not tied to a planned slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub slot_id: Option<SlotId>,
    #[serde(flatten)]
    pub result: ForecastResult,
}
