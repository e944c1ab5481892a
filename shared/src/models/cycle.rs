use crate::types::{GpsCoordinates, Nutrients, SoilClass};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a crop cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Completed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Active => "active",
            CycleStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CycleStatus::Active),
            "completed" => Ok(CycleStatus::Completed),
            other => Err(format!("unknown cycle status: {other}")),
        }
    }
}

/// Why a cycle was completed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionReason {
    /// Planned duration elapsed
    Elapsed,
    /// Completed explicitly by the grower
    Manual,
}

impl CompletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionReason::Elapsed => "elapsed",
            CompletionReason::Manual => "manual",
        }
    }
}

impl std::str::FromStr for CompletionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elapsed" => Ok(CompletionReason::Elapsed),
            "manual" => Ok(CompletionReason::Manual),
            other => Err(format!("unknown completion reason: {other}")),
        }
    }
}

/// A crop cycle: one growing season on one plot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub crop: String,
    pub soil_class: SoilClass,
    pub coordinates: GpsCoordinates,
    pub started_at: DateTime<Utc>,
    pub planned_duration_days: i64,
    pub status: CycleStatus,
    /// Set once nutrient status drops to Low or Critical; never cleared
    /// automatically while the cycle stays active
    pub low_nutrient_warning: bool,
    /// Set once the planned duration has elapsed and the cycle is awaiting
    /// completion
    pub completion_due: bool,
    pub last_weather_check: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_reason: Option<CompletionReason>,
    pub created_at: DateTime<Utc>,
}

impl Cycle {
    pub fn planned_end(&self) -> DateTime<Utc> {
        self.started_at + Duration::days(self.planned_duration_days)
    }

    pub fn is_active(&self) -> bool {
        self.status == CycleStatus::Active
    }

    /// Fraction of the planned duration elapsed at `at`, clamped to [0, 1]
    pub fn elapsed_fraction(&self, at: DateTime<Utc>) -> f64 {
        let total = (self.planned_end() - self.started_at).num_seconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (at - self.started_at).num_seconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub fn is_past_duration(&self, at: DateTime<Utc>) -> bool {
        at >= self.planned_end()
    }

    pub fn progress(&self, at: DateTime<Utc>) -> CycleProgress {
        let days_elapsed = (at - self.started_at).num_days().max(0);
        let days_remaining = (self.planned_duration_days - days_elapsed).max(0);
        CycleProgress {
            days_elapsed,
            days_remaining,
            total_days: self.planned_duration_days,
            percent_complete: self.elapsed_fraction(at) * 100.0,
        }
    }
}

/// Time progress through a cycle's planned duration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CycleProgress {
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub total_days: i64,
    pub percent_complete: f64,
}

/// Breakdown of where nutrients went over a cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DepletionSummary {
    pub crop_uptake: Nutrients,
    pub rainfall_loss: Nutrients,
    pub total_depletion: Nutrients,
}

/// Result of completing a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub cycle_id: Uuid,
    pub reason: CompletionReason,
    pub completed_at: DateTime<Utc>,
    pub final_nutrients: Nutrients,
    pub summary: DepletionSummary,
    /// Whether the remaining nutrients support starting another cycle
    /// without replenishment
    pub can_continue: bool,
}
