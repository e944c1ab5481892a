//! Weather API client for fetching current conditions
//!
//! Integrates with the OpenWeatherMap current weather API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use shared::{GpsCoordinates, WeatherSample};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Source of weather observations for a location.
///
/// The production implementation talks to OpenWeatherMap; tests substitute
/// scripted gateways.
#[async_trait]
pub trait WeatherGateway: Send + Sync {
    /// Fetch the current weather observation for a location
    async fn current_weather(&self, coordinates: GpsCoordinates) -> AppResult<WeatherSample>;
}

/// OpenWeatherMap client
#[derive(Clone)]
pub struct OpenWeatherClient {
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
    description: String,
}

#[derive(Debug, Deserialize)]
struct OWMMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OWMRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hour: Option<f64>,
}

impl OpenWeatherClient {
    /// Create a new client against the production endpoint
    pub fn new(api_key: String, timeout: Duration) -> AppResult<Self> {
        Self::with_base_url(
            api_key,
            "https://api.openweathermap.org/data/2.5".to_string(),
            timeout,
        )
    }

    /// Create a new client with a custom base URL (for testing)
    pub fn with_base_url(api_key: String, base_url: String, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    fn convert_current_response(&self, data: OWMCurrentResponse) -> WeatherSample {
        // Prefer the 1h bucket, fall back to the 3h bucket
        let rainfall_mm = data
            .rain
            .as_ref()
            .and_then(|r| r.one_hour.or(r.three_hour))
            .unwrap_or(0.0);

        WeatherSample {
            observed_at: DateTime::from_timestamp(data.dt, 0).unwrap_or_else(Utc::now),
            rainfall_mm,
            temperature_c: Some(data.main.temp),
            humidity_pct: Some(data.main.humidity),
            description: data.weather.first().map(|w| w.description.clone()),
        }
    }
}

#[async_trait]
impl WeatherGateway for OpenWeatherClient {
    async fn current_weather(&self, coordinates: GpsCoordinates) -> AppResult<WeatherSample> {
        let url = format!(
            "{}/weather?lat={}&lon={}&appid={}&units=metric",
            self.base_url, coordinates.latitude, coordinates.longitude, self.api_key
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::GatewayTimeout
            } else {
                AppError::GatewayError(format!("request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayError(format!("{} - {}", status, body)));
        }

        let data: OWMCurrentResponse = response
            .json()
            .await
            .map_err(|e| AppError::GatewayError(format!("failed to parse response: {}", e)))?;

        Ok(self.convert_current_response(data))
    }
}
