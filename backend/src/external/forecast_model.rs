//! Rain nowcast model adapters
//!
//! The model is a black box mapping the feature vector to a rain
//! probability and, optionally, an amount estimate. Two adapters exist:
//! a logistic model read from a coefficients file and a remote
//! model-serving endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

use crate::error::{AppError, AppResult};

/// Raw model output before validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub probability: f64,
    #[serde(default)]
    pub amount_mm: Option<f64>,
}

#[async_trait]
pub trait ForecastModel: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> AppResult<ModelPrediction>;

    /// Probability at or above which the predicted label is "rain"
    fn threshold(&self) -> f64 {
        0.5
    }

    fn name(&self) -> &str;
}

// ============================================================================
// Logistic model from a coefficients file
// ============================================================================

/// Coefficients file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub features: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
    #[serde(default = "default_threshold")]
    pub threshold_default: f64,
    #[serde(default)]
    pub amount_weights: Option<Vec<f64>>,
    #[serde(default)]
    pub amount_bias: f64,
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone)]
pub struct LinearForecastModel {
    coefficients: LinearCoefficients,
}

impl LinearForecastModel {
    /// Validate that the coefficients line up with the feature vector
    pub fn new(coefficients: LinearCoefficients) -> AppResult<Self> {
        if coefficients.features.len() != FEATURE_COUNT
            || coefficients.features.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(AppError::ModelInference(format!(
                "feature order mismatch: model expects {:?}",
                coefficients.features
            )));
        }
        if coefficients.weights.len() != FEATURE_COUNT {
            return Err(AppError::ModelInference(format!(
                "shape mismatch: {} weights for {} features",
                coefficients.weights.len(),
                FEATURE_COUNT
            )));
        }
        if let Some(amount) = &coefficients.amount_weights {
            if amount.len() != FEATURE_COUNT {
                return Err(AppError::ModelInference(format!(
                    "shape mismatch: {} amount weights for {} features",
                    amount.len(),
                    FEATURE_COUNT
                )));
            }
        }
        Ok(Self { coefficients })
    }

    pub async fn from_file(path: &Path) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ModelInference(format!("cannot load {}: {}", path.display(), e))
        })?;
        let coefficients: LinearCoefficients = serde_json::from_str(&raw).map_err(|e| {
            AppError::ModelInference(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Self::new(coefficients)
    }

    fn dot(weights: &[f64], x: &[f64; FEATURE_COUNT]) -> f64 {
        weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum()
    }
}

#[async_trait]
impl ForecastModel for LinearForecastModel {
    async fn predict(&self, features: &FeatureVector) -> AppResult<ModelPrediction> {
        let x = features.to_array();
        let z = self.coefficients.bias + Self::dot(&self.coefficients.weights, &x);
        let probability = 1.0 / (1.0 + (-z).exp());
        let amount_mm = self
            .coefficients
            .amount_weights
            .as_ref()
            .map(|w| self.coefficients.amount_bias + Self::dot(w, &x));
        Ok(ModelPrediction {
            probability,
            amount_mm,
        })
    }

    fn threshold(&self) -> f64 {
        self.coefficients.threshold_default
    }

    fn name(&self) -> &str {
        "linear"
    }
}

// ============================================================================
// Remote model-serving endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    features: [f64; FEATURE_COUNT],
    feature_names: &'a [&'static str],
}

/// Client for a model served over HTTP
#[derive(Clone)]
pub struct HttpForecastModel {
    client: Client,
    endpoint: String,
    threshold: f64,
}

impl HttpForecastModel {
    pub fn new(endpoint: String, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            threshold: default_threshold(),
        })
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl ForecastModel for HttpForecastModel {
    async fn predict(&self, features: &FeatureVector) -> AppResult<ModelPrediction> {
        let request = PredictRequest {
            features: features.to_array(),
            feature_names: &FEATURE_NAMES,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ModelInference(format!("model request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelInference(format!(
                "model endpoint error: {} - {}",
                status, body
            )));
        }

        response
            .json::<ModelPrediction>()
            .await
            .map_err(|e| AppError::ModelInference(format!("malformed model response: {}", e)))
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Placeholder when no model could be loaded
// ============================================================================

/// Stands in for a model that failed to load; every call fails, so slot
/// checks fail open and irrigate as planned.
#[derive(Debug, Clone)]
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ForecastModel for UnavailableModel {
    async fn predict(&self, _features: &FeatureVector) -> AppResult<ModelPrediction> {
        Err(AppError::ModelInference(format!(
            "model unavailable: {}",
            self.reason
        )))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
