//! Common types used across the platform

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// GPS coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// N/P/K nutrient levels in kg/ha
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Nutrients {
    pub n: f64,
    pub p: f64,
    pub k: f64,
}

impl Nutrients {
    pub const ZERO: Nutrients = Nutrients {
        n: 0.0,
        p: 0.0,
        k: 0.0,
    };

    pub fn new(n: f64, p: f64, k: f64) -> Self {
        Self { n, p, k }
    }

    /// Componentwise sum
    pub fn add(self, other: Nutrients) -> Nutrients {
        Nutrients {
            n: self.n + other.n,
            p: self.p + other.p,
            k: self.k + other.k,
        }
    }

    /// Componentwise subtraction, floored at zero
    pub fn saturating_sub(self, other: Nutrients) -> Nutrients {
        Nutrients {
            n: (self.n - other.n).max(0.0),
            p: (self.p - other.p).max(0.0),
            k: (self.k - other.k).max(0.0),
        }
    }

    /// Componentwise scaling
    pub fn scale(self, factor: f64) -> Nutrients {
        Nutrients {
            n: self.n * factor,
            p: self.p * factor,
            k: self.k * factor,
        }
    }

    /// Componentwise minimum
    pub fn min(self, other: Nutrients) -> Nutrients {
        Nutrients {
            n: self.n.min(other.n),
            p: self.p.min(other.p),
            k: self.k.min(other.k),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.n.is_finite() && self.p.is_finite() && self.k.is_finite()
    }

    pub fn is_non_negative(&self) -> bool {
        self.n >= 0.0 && self.p >= 0.0 && self.k >= 0.0
    }

    /// True if every component is at or above the matching component of `floor`
    pub fn all_at_least(&self, floor: Nutrients) -> bool {
        self.n >= floor.n && self.p >= floor.p && self.k >= floor.k
    }
}

impl std::fmt::Display for Nutrients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N={:.2} P={:.2} K={:.2}", self.n, self.p, self.k)
    }
}

/// Soil texture classes tracked by the depletion model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SoilClass {
    Sandy,
    Loamy,
    Clay,
}

/// Returned when a soil class string is not one of the supported classes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown soil class: {0}")]
pub struct UnknownSoilClassError(pub String);

impl SoilClass {
    pub const ALL: [SoilClass; 3] = [SoilClass::Sandy, SoilClass::Loamy, SoilClass::Clay];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoilClass::Sandy => "sandy",
            SoilClass::Loamy => "loamy",
            SoilClass::Clay => "clay",
        }
    }

    /// Classify USDA-style texture percentages into a soil class.
    ///
    /// Percentages must sum to 100 (1% tolerance for rounding).
    pub fn from_texture(
        sand_pct: f64,
        silt_pct: f64,
        clay_pct: f64,
    ) -> Result<SoilClass, &'static str> {
        let total = sand_pct + silt_pct + clay_pct;
        if !(99.0..=101.0).contains(&total) {
            return Err("texture percentages must sum to 100");
        }
        if sand_pct < 0.0 || silt_pct < 0.0 || clay_pct < 0.0 {
            return Err("texture percentages cannot be negative");
        }

        // Simplified USDA texture triangle
        let class = if clay_pct >= 40.0 {
            SoilClass::Clay
        } else if sand_pct >= 50.0 {
            SoilClass::Sandy
        } else if clay_pct >= 27.0 {
            SoilClass::Clay
        } else {
            SoilClass::Loamy
        };
        Ok(class)
    }
}

impl FromStr for SoilClass {
    type Err = UnknownSoilClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandy" => Ok(SoilClass::Sandy),
            "loamy" => Ok(SoilClass::Loamy),
            "clay" => Ok(SoilClass::Clay),
            other => Err(UnknownSoilClassError(other.to_string())),
        }
    }
}

impl std::fmt::Display for SoilClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
