use crate::types::Nutrients;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Qualitative level of a single nutrient, worst first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NutrientLevel {
    Critical,
    Low,
    Moderate,
    Good,
}

impl NutrientLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NutrientLevel::Critical => "critical",
            NutrientLevel::Low => "low",
            NutrientLevel::Moderate => "moderate",
            NutrientLevel::Good => "good",
        }
    }
}

impl std::fmt::Display for NutrientLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-nutrient classification plus the overall verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NutrientStatus {
    pub n: NutrientLevel,
    pub p: NutrientLevel,
    pub k: NutrientLevel,
    /// Worst of the three per-nutrient levels
    pub overall: NutrientLevel,
    /// True when the overall level warrants a fresh soil test
    pub needs_retest: bool,
}

/// Running nutrient ledger for one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NutrientState {
    pub cycle_id: Uuid,
    /// Levels measured at cycle start
    pub initial: Nutrients,
    /// Current estimate, always initial - losses floored at zero
    pub current: Nutrients,
    /// Cumulative crop uptake applied so far
    pub uptake_loss: Nutrients,
    /// Cumulative rainfall leaching applied so far
    pub rainfall_loss: Nutrients,
    /// Uptake has been accrued up to this instant
    pub uptake_applied_through: DateTime<Utc>,
    /// Observation time of the newest weather sample folded in
    pub last_sample_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl NutrientState {
    /// Ledger for a freshly started cycle
    pub fn opening(cycle_id: Uuid, initial: Nutrients, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            initial,
            current: initial,
            uptake_loss: Nutrients::ZERO,
            rainfall_loss: Nutrients::ZERO,
            uptake_applied_through: started_at,
            last_sample_at: None,
            updated_at: started_at,
        }
    }

    /// Record uptake accrued since `uptake_applied_through`, advancing the
    /// marker to `through`
    pub fn apply_uptake(&mut self, delta: Nutrients, through: DateTime<Utc>) {
        self.uptake_loss = self.uptake_loss.add(delta);
        self.uptake_applied_through = through;
        self.reconcile();
    }

    /// Record a rainfall leaching loss
    pub fn apply_rainfall(&mut self, loss: Nutrients) {
        self.rainfall_loss = self.rainfall_loss.add(loss);
        self.reconcile();
    }

    pub fn total_depletion(&self) -> Nutrients {
        self.uptake_loss.add(self.rainfall_loss)
    }

    fn reconcile(&mut self) {
        self.current = self.initial.saturating_sub(self.total_depletion());
    }
}
