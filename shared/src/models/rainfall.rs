use crate::types::{Nutrients, SoilClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An observed rainfall event and the nutrient loss it caused
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RainfallEvent {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub rainfall_mm: f64,
    pub soil_class: SoilClass,
    /// Nutrient levels immediately before this event was applied
    pub nutrients_before: Nutrients,
    /// Leaching loss attributed to this event
    pub loss: Nutrients,
    /// Nutrient levels after this event was applied
    pub nutrients_after: Nutrients,
    pub recorded_at: DateTime<Utc>,
}
