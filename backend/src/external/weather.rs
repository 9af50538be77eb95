//! Weather API client for fetching weather data
//!
//! Integrates with the OpenWeatherMap API and converts current conditions
//! and the 3-hourly forecast into hourly [`WeatherRow`]s.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use shared::{Location, WeatherRow};

use crate::error::{AppError, AppResult};

/// UV index is not part of the free endpoints
const DEFAULT_UVI: f64 = 5.0;

/// Weather API client
#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// OpenWeatherMap API response for current weather
#[derive(Debug, Deserialize)]
struct OWMCurrentResponse {
    weather: Vec<OWMWeather>,
    main: OWMMain,
    rain: Option<OWMRain>,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct OWMWeather {
    id: u16,
}

#[derive(Debug, Deserialize)]
struct OWMMain {
    temp: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OWMRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hour: Option<f64>,
}

/// OpenWeatherMap API response for forecast
#[derive(Debug, Deserialize)]
struct OWMForecastResponse {
    list: Vec<OWMForecastItem>,
}

#[derive(Debug, Deserialize)]
struct OWMForecastItem {
    dt: i64,
    main: OWMMain,
    weather: Vec<OWMWeather>,
    #[serde(default)]
    pop: f64,
    rain: Option<OWMRain>,
}

impl WeatherClient {
    /// Create a new WeatherClient
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openweathermap.org/data/2.5".to_string())
    }

    /// Create a new WeatherClient with custom base URL (for testing)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    /// Current conditions as a single weather row
    pub async fn get_current(&self, location: Location) -> AppResult<WeatherRow> {
        let data: OWMCurrentResponse = self.fetch("weather", location).await?;
        Ok(convert_current(data))
    }

    /// 3-hourly forecast expanded to rows
    pub async fn get_forecast(&self, location: Location) -> AppResult<Vec<WeatherRow>> {
        let data: OWMForecastResponse = self.fetch("forecast", location).await?;
        Ok(data.list.into_iter().filter_map(convert_forecast_item).collect())
    }

    /// Current conditions followed by the forecast, sorted by time
    pub async fn get_rows(&self, location: Location) -> AppResult<Vec<WeatherRow>> {
        let mut rows = self.get_forecast(location).await?;
        rows.push(self.get_current(location).await?);
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        location: Location,
    ) -> AppResult<T> {
        let url = format!(
            "{}/{}?lat={}&lon={}&appid={}&units=metric",
            self.base_url, endpoint, location.lat, location.lon, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Weather API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Weather API error: {} - {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse weather response: {}", e))
        })
    }
}

fn convert_current(data: OWMCurrentResponse) -> WeatherRow {
    let rain_1h = data
        .rain
        .as_ref()
        .and_then(|r| r.one_hour.or(r.three_hour.map(|v| v / 3.0)))
        .unwrap_or(0.0);
    WeatherRow {
        timestamp: DateTime::from_timestamp(data.dt, 0).unwrap_or_else(Utc::now),
        api_temp_c: data.main.temp,
        api_rh_pct: data.main.humidity,
        api_pressure_hpa: Some(data.main.pressure),
        api_uvi: DEFAULT_UVI,
        api_weather_code: data.weather.first().map(|w| w.id).unwrap_or(0),
        api_rain_1h: rain_1h,
        // Observed rain is certain; otherwise unknown
        api_pop: if rain_1h > 0.0 { 1.0 } else { 0.0 },
    }
}

fn convert_forecast_item(item: OWMForecastItem) -> Option<WeatherRow> {
    let timestamp = DateTime::from_timestamp(item.dt, 0)?;
    Some(WeatherRow {
        timestamp,
        api_temp_c: item.main.temp,
        api_rh_pct: item.main.humidity,
        api_pressure_hpa: Some(item.main.pressure),
        api_uvi: DEFAULT_UVI,
        api_weather_code: item.weather.first().map(|w| w.id).unwrap_or(0),
        // 3-hour accumulation spread evenly over the hours
        api_rain_1h: item
            .rain
            .and_then(|r| r.three_hour)
            .map(|v| v / 3.0)
            .unwrap_or(0.0),
        api_pop: item.pop.clamp(0.0, 1.0),
    })
}
