//! Shared test harness: in-memory store plus a scriptable weather gateway

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{GpsCoordinates, NutrientModel, Nutrients, SoilClass, WeatherSample};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use cropsense_backend::error::{AppError, AppResult};
use cropsense_backend::external::WeatherGateway;
use cropsense_backend::services::{CycleService, StartCycleRequest};
use cropsense_backend::store::MemoryCycleStore;

type Script = dyn Fn(GpsCoordinates) -> AppResult<WeatherSample> + Send + Sync;

/// Gateway whose behaviour is a closure over the requested coordinates
pub struct ScriptedGateway {
    script: Box<Script>,
}

impl ScriptedGateway {
    pub fn new(
        script: impl Fn(GpsCoordinates) -> AppResult<WeatherSample> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
        }
    }

    /// Gateway that always reports the same rainfall amount
    pub fn constant_rain(rainfall_mm: f64) -> Self {
        Self::new(move |_| Ok(sample_at(Utc::now(), rainfall_mm)))
    }

    /// Gateway that always times out
    pub fn always_timeout() -> Self {
        Self::new(|_| Err(AppError::GatewayTimeout))
    }
}

#[async_trait]
impl WeatherGateway for ScriptedGateway {
    async fn current_weather(&self, coordinates: GpsCoordinates) -> AppResult<WeatherSample> {
        (self.script)(coordinates)
    }
}

pub fn sample_at(observed_at: DateTime<Utc>, rainfall_mm: f64) -> WeatherSample {
    WeatherSample {
        observed_at,
        rainfall_mm,
        temperature_c: Some(24.0),
        humidity_pct: Some(70.0),
        description: if rainfall_mm > 0.0 {
            Some("light rain".to_string())
        } else {
            Some("clear sky".to_string())
        },
    }
}

pub fn service_with(gateway: ScriptedGateway) -> (Arc<CycleService>, Arc<MemoryCycleStore>) {
    let store = Arc::new(MemoryCycleStore::new());
    let service = CycleService::new(
        Arc::clone(&store) as Arc<dyn cropsense_backend::store::CycleStore>,
        Arc::new(gateway),
        NutrientModel::default(),
        Duration::from_secs(5),
    );
    (Arc::new(service), store)
}

/// Standard rice-on-loam request used throughout the suites
pub fn rice_request(owner_id: Uuid, started_at: Option<DateTime<Utc>>) -> StartCycleRequest {
    StartCycleRequest {
        owner_id,
        crop: "rice".to_string(),
        soil_class: SoilClass::Loamy,
        coordinates: GpsCoordinates::new(13.0827, 80.2707),
        initial_nutrients: Nutrients::new(90.0, 42.0, 43.0),
        duration_days: None,
        started_at,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}
