use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One weather observation for a location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherSample {
    pub observed_at: DateTime<Utc>,
    /// Rainfall since the previous observation, millimetres
    pub rainfall_mm: f64,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub description: Option<String>,
}

impl WeatherSample {
    pub fn has_rainfall(&self) -> bool {
        self.rainfall_mm > 0.0
    }
}
