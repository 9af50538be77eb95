//! External integrations: forecast model, message broker, weather API

pub mod forecast_model;
pub mod mqtt;
pub mod publisher;
pub mod weather;

pub use forecast_model::{
    ForecastModel, HttpForecastModel, LinearCoefficients, LinearForecastModel, ModelPrediction,
    UnavailableModel,
};
pub use mqtt::MqttPublisher;
pub use publisher::{LogPublisher, Publisher};
pub use weather::WeatherClient;
