//! Error handling for the irrigation agent
//!
//! Provides consistent error responses in English and Vietnamese

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::TransitionError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Data errors
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No weather reference near {0}")]
    StaleReference(String),

    #[error("Out-of-order reading: {0}")]
    OutOfOrder(String),

    #[error("Sensor dropout")]
    SensorDropout,

    #[error("Data source error: {0}")]
    DataSource(String),

    // Port errors
    #[error("Model inference failed: {0}")]
    ModelInference(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_vi: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::DataSource(err.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code, also used in logs
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InsufficientData(_) => "INSUFFICIENT_DATA",
            AppError::StaleReference(_) => "STALE_REFERENCE",
            AppError::OutOfOrder(_) => "OUT_OF_ORDER",
            AppError::SensorDropout => "SENSOR_DROPOUT",
            AppError::DataSource(_) => "DATA_SOURCE_ERROR",
            AppError::ModelInference(_) => "MODEL_INFERENCE_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
            AppError::Publish(_) => "PUBLISH_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_vi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: String, message_vi: String) -> Self {
        Self {
            code: code.to_string(),
            message_en,
            message_vi,
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InsufficientData(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INSUFFICIENT_DATA",
                    format!("Not enough sensor data: {}", msg),
                    format!("Không đủ dữ liệu cảm biến: {}", msg),
                ),
            ),
            AppError::StaleReference(at) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "STALE_REFERENCE",
                    format!("No weather data near {}", at),
                    format!("Không có dữ liệu thời tiết gần {}", at),
                ),
            ),
            AppError::OutOfOrder(msg) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "OUT_OF_ORDER",
                    format!("Reading is older than the latest one: {}", msg),
                    format!("Bản ghi cũ hơn bản ghi mới nhất: {}", msg),
                ),
            ),
            AppError::SensorDropout => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "SENSOR_DROPOUT",
                    "Temperature, humidity and soil moisture are all zero".to_string(),
                    "Nhiệt độ, độ ẩm và độ ẩm đất đều bằng 0".to_string(),
                ),
            ),
            AppError::DataSource(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "DATA_SOURCE_ERROR",
                    format!("Data source error: {}", msg),
                    format!("Lỗi nguồn dữ liệu: {}", msg),
                ),
            ),
            AppError::ModelInference(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    "MODEL_INFERENCE_ERROR",
                    format!("Forecast model error: {}", msg),
                    format!("Lỗi mô hình dự báo: {}", msg),
                ),
            ),
            AppError::Persistence(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "PERSISTENCE_ERROR",
                    format!("Could not save the schedule: {}", msg),
                    format!("Không thể lưu lịch tưới: {}", msg),
                ),
            ),
            AppError::Publish(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    "PUBLISH_ERROR",
                    format!("Could not publish event: {}", msg),
                    format!("Không thể gửi sự kiện: {}", msg),
                ),
            ),
            AppError::Timeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorDetail::new(
                    "TIMEOUT",
                    format!("Operation timed out: {}", msg),
                    format!("Hết thời gian chờ: {}", msg),
                ),
            ),
            AppError::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new(
                    "EXTERNAL_SERVICE_ERROR",
                    format!("External service error: {}", msg),
                    format!("Lỗi dịch vụ bên ngoài: {}", msg),
                ),
            ),
            AppError::Validation {
                field,
                message,
                message_vi,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_vi: message_vi.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Dữ liệu không hợp lệ: {}", msg),
                ),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("Không tìm thấy {}", resource),
                ),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    msg.clone(),
                    format!("Không thể chuyển trạng thái: {}", msg),
                ),
            ),
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "CONFIGURATION_ERROR",
                    format!("Configuration error: {}", msg),
                    format!("Lỗi cấu hình: {}", msg),
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    msg.clone(),
                    "Lỗi máy chủ nội bộ".to_string(),
                ),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    "Lỗi máy chủ nội bộ".to_string(),
                ),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;
