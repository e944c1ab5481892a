//! Rainfall-induced nutrient depletion model
//!
//! Pure calculations only: rainfall leaching, crop uptake accrual, and
//! threshold classification. All persistence and scheduling lives in the
//! backend; this module never does IO.

use crate::models::{NutrientLevel, NutrientStatus};
use crate::types::{Nutrients, SoilClass};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown crop: {0}")]
    UnknownCrop(String),
}

/// Nutrient demand profile for one crop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CropProfile {
    /// Total N/P/K drawn from the soil over a full cycle, kg/ha
    pub total_uptake: Nutrients,
    /// Typical cycle length used when the grower does not supply one
    pub typical_cycle_days: i64,
}

/// Per-soil leaching coefficients, one triple per soil class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LeachingTable {
    pub sandy: Nutrients,
    pub loamy: Nutrients,
    pub clay: Nutrients,
}

impl LeachingTable {
    pub fn coefficients(&self, soil: SoilClass) -> Nutrients {
        match soil {
            SoilClass::Sandy => self.sandy,
            SoilClass::Loamy => self.loamy,
            SoilClass::Clay => self.clay,
        }
    }
}

/// Lower bounds of the Low, Moderate and Good bands per nutrient
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdTable {
    /// Below this the nutrient is critical
    pub critical: Nutrients,
    /// Below this (and at or above critical) the nutrient is low
    pub low: Nutrients,
    /// Below this (and at or above low) the nutrient is moderate
    pub moderate: Nutrients,
}

/// Tunable parameters of the depletion model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    crops: HashMap<String, CropProfile>,
    pub leaching: LeachingTable,
    pub thresholds: ThresholdTable,
    /// Minimum per-nutrient levels for starting a follow-on cycle without
    /// replenishment
    pub continuation_floor: Nutrients,
    /// Rainfall at which leaching saturates, millimetres
    pub saturation_rainfall_mm: f64,
}

/// (name, total N, total P, total K, typical cycle days)
const CROP_TABLE: &[(&str, f64, f64, f64, i64)] = &[
    ("rice", 120.0, 40.0, 140.0, 120),
    ("maize", 150.0, 50.0, 180.0, 100),
    ("chickpea", 80.0, 30.0, 40.0, 100),
    ("kidneybeans", 70.0, 25.0, 50.0, 90),
    ("pigeonpeas", 75.0, 30.0, 45.0, 240),
    ("mothbeans", 60.0, 20.0, 35.0, 75),
    ("mungbean", 65.0, 22.0, 40.0, 60),
    ("blackgram", 70.0, 25.0, 45.0, 90),
    ("lentil", 75.0, 28.0, 42.0, 110),
    ("pomegranate", 200.0, 60.0, 250.0, 210),
    ("banana", 300.0, 80.0, 500.0, 270),
    ("mango", 250.0, 70.0, 300.0, 150),
    ("coconut", 180.0, 50.0, 350.0, 365),
    ("cotton", 160.0, 55.0, 200.0, 180),
    ("coffee", 220.0, 65.0, 280.0, 365),
    ("jute", 110.0, 40.0, 90.0, 120),
    ("apple", 180.0, 55.0, 220.0, 150),
    ("orange", 200.0, 60.0, 240.0, 240),
    ("papaya", 150.0, 45.0, 200.0, 270),
    ("watermelon", 100.0, 35.0, 150.0, 80),
    ("grapes", 140.0, 48.0, 190.0, 150),
    ("muskmelon", 90.0, 30.0, 130.0, 90),
];

impl Default for ModelConfig {
    fn default() -> Self {
        let crops = CROP_TABLE
            .iter()
            .map(|&(name, n, p, k, days)| {
                (
                    name.to_string(),
                    CropProfile {
                        total_uptake: Nutrients::new(n, p, k),
                        typical_cycle_days: days,
                    },
                )
            })
            .collect();

        Self {
            crops,
            leaching: LeachingTable {
                sandy: Nutrients::new(0.69, 0.62, 0.74),
                loamy: Nutrients::new(0.49, 0.446, 0.532),
                clay: Nutrients::new(0.29, 0.27, 0.32),
            },
            thresholds: ThresholdTable {
                critical: Nutrients::new(30.0, 10.0, 40.0),
                low: Nutrients::new(60.0, 20.0, 80.0),
                moderate: Nutrients::new(100.0, 30.0, 120.0),
            },
            continuation_floor: Nutrients::new(30.0, 10.0, 40.0),
            saturation_rainfall_mm: 100.0,
        }
    }
}

/// The depletion model with its parameter tables
#[derive(Debug, Clone, Default)]
pub struct NutrientModel {
    config: ModelConfig,
}

impl NutrientModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Look up a crop's demand profile, case-insensitively
    pub fn crop_profile(&self, crop: &str) -> Result<&CropProfile, ModelError> {
        let key = crop.trim().to_lowercase();
        self.config
            .crops
            .get(&key)
            .ok_or(ModelError::UnknownCrop(key))
    }

    pub fn known_crops(&self) -> impl Iterator<Item = &str> {
        self.config.crops.keys().map(String::as_str)
    }

    /// Total uptake accrued by `elapsed_fraction` of the cycle.
    ///
    /// Accrual is linear in time and clamps at the crop's full-cycle demand.
    pub fn crop_uptake(&self, crop: &str, elapsed_fraction: f64) -> Result<Nutrients, ModelError> {
        let profile = self.crop_profile(crop)?;
        Ok(profile.total_uptake.scale(elapsed_fraction.clamp(0.0, 1.0)))
    }

    /// Leaching saturation factor for a rainfall amount, in [0, 1]
    pub fn saturation(&self, rainfall_mm: f64) -> f64 {
        if rainfall_mm <= 0.0 {
            return 0.0;
        }
        (rainfall_mm / self.config.saturation_rainfall_mm).min(1.0)
    }

    /// Nutrient loss caused by one rainfall event.
    ///
    /// Proportional to current levels, so the loss can never exceed what is
    /// in the soil.
    pub fn rainfall_loss(&self, rainfall_mm: f64, soil: SoilClass, current: Nutrients) -> Nutrients {
        let coefficients = self.config.leaching.coefficients(soil);
        let saturation = self.saturation(rainfall_mm);
        Nutrients {
            n: current.n * coefficients.n * saturation,
            p: current.p * coefficients.p * saturation,
            k: current.k * coefficients.k * saturation,
        }
        .min(current)
    }

    /// Classify current levels against the threshold bands
    pub fn evaluate(&self, current: Nutrients) -> NutrientStatus {
        let n = self.classify(current.n, |t| t.n);
        let p = self.classify(current.p, |t| t.p);
        let k = self.classify(current.k, |t| t.k);
        let overall = n.min(p).min(k);
        NutrientStatus {
            n,
            p,
            k,
            overall,
            needs_retest: overall <= NutrientLevel::Low,
        }
    }

    /// Whether remaining levels support a follow-on cycle without
    /// replenishment
    pub fn can_continue(&self, remaining: Nutrients) -> bool {
        remaining.all_at_least(self.config.continuation_floor)
    }

    fn classify(&self, value: f64, component: impl Fn(Nutrients) -> f64) -> NutrientLevel {
        let t = &self.config.thresholds;
        if value < component(t.critical) {
            NutrientLevel::Critical
        } else if value < component(t.low) {
            NutrientLevel::Low
        } else if value < component(t.moderate) {
            NutrientLevel::Moderate
        } else {
            NutrientLevel::Good
        }
    }
}
