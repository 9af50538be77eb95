//! Features → forecast model → decision policy
//!
//! Shared by the slot trigger scan, the live nowcast path and the HTTP
//! surface. Every call works on a window snapshot taken under the read lock
//! and released before any await.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    normalize_amount, validate_probability, DecisionThresholds, FeatureVector, ForecastResult,
    RainPrediction, SensorReading, SensorRef,
};

use crate::error::{AppError, AppResult};
use crate::external::{ForecastModel, ModelPrediction};
use crate::services::feature_extractor::FeatureExtractor;
use crate::services::sensor_window::SharedWindow;
use crate::services::weather_source::SharedWeather;

/// Features computed for one point in time
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// Newest reading at or before the evaluation time
    pub reference: SensorReading,
    pub features: FeatureVector,
}

/// Validated model output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub probability: f64,
    pub amount_mm: f64,
}

pub struct DecisionEngine {
    window: SharedWindow,
    weather: SharedWeather,
    extractor: FeatureExtractor,
    model: Arc<dyn ForecastModel>,
    thresholds: DecisionThresholds,
    timeout: Duration,
}

impl DecisionEngine {
    pub fn new(
        window: SharedWindow,
        weather: SharedWeather,
        extractor: FeatureExtractor,
        model: Arc<dyn ForecastModel>,
        thresholds: DecisionThresholds,
        timeout: Duration,
    ) -> Self {
        Self {
            window,
            weather,
            extractor,
            model,
            thresholds,
            timeout,
        }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    /// Build features from the readings at or before `at`
    pub fn prepare(&self, at: DateTime<Utc>) -> AppResult<PreparedInput> {
        let readings = self.window.read().snapshot_before(at)?;
        let reference = readings
            .last()
            .cloned()
            .ok_or_else(|| AppError::InsufficientData("empty window".to_string()))?;

        let weather = self.weather.row_or_default(reference.timestamp);
        let features = self.extractor.extract(&readings, &weather, at);
        if !features.is_finite() {
            return Err(AppError::ModelInference(
                "feature vector contains non-finite values".to_string(),
            ));
        }

        Ok(PreparedInput {
            reference,
            features,
        })
    }

    /// Call the model with a bounded wait and validate what comes back
    pub async fn infer(&self, features: &FeatureVector) -> AppResult<Inference> {
        let raw: ModelPrediction =
            match tokio::time::timeout(self.timeout, self.model.predict(features)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AppError::Timeout(format!(
                        "{} model after {:?}",
                        self.model.name(),
                        self.timeout
                    )))
                }
            };

        validate_probability(raw.probability)
            .map_err(|msg| AppError::ModelInference(format!("{}: {}", msg, raw.probability)))?;
        let amount_mm = match raw.amount_mm {
            Some(amount) => normalize_amount(amount)
                .map_err(|msg| AppError::ModelInference(msg.to_string()))?,
            None => 0.0,
        };

        Ok(Inference {
            probability: raw.probability,
            amount_mm,
        })
    }

    /// Apply the policy to a prepared input and an inference result
    pub fn conclude(&self, input: &PreparedInput, inference: Inference) -> ForecastResult {
        let reference = &input.reference;
        let label = u8::from(inference.probability >= self.model.threshold());
        let decision = self
            .thresholds
            .decide(reference.soil_moisture, inference.probability);

        ForecastResult::from_decision(
            reference.timestamp,
            RainPrediction {
                probability: inference.probability,
                label,
                amount_mm: inference.amount_mm,
            },
            SensorRef {
                soil_moist_pct: reference.soil_moisture,
                temp_c: reference.temperature,
                rh_pct: reference.humidity,
                pressure_hpa: reference.pressure,
            },
            &decision,
        )
    }

    /// Full evaluation as of `at`; any failure is returned to the caller
    pub async fn evaluate_as_of(&self, at: DateTime<Utc>) -> AppResult<ForecastResult> {
        let input = self.prepare(at)?;
        let inference = self.infer(&input.features).await?;
        Ok(self.conclude(&input, inference))
    }

    /// Evaluation for the newest reading in the window
    pub async fn evaluate_latest(&self) -> AppResult<ForecastResult> {
        let at = self
            .window
            .read()
            .latest()
            .map(|r| r.timestamp)
            .ok_or_else(|| AppError::InsufficientData("no sensor readings yet".to_string()))?;
        self.evaluate_as_of(at).await
    }
}
