//! Crop cycle engine
//!
//! Owns the lifecycle of a cycle and folds weather observations into its
//! nutrient ledger. All mutations for one cycle are serialized through a
//! per-cycle lock so scheduled and manual checks cannot interleave.

use chrono::{DateTime, Utc};
use shared::{
    validate_coordinates, validate_duration_days, validate_nutrients, validate_rainfall_mm,
    CompletionReason, CompletionResult, CropProfile, Cycle, CycleProgress, CycleStatus,
    DepletionSummary, GpsCoordinates, NutrientModel, NutrientState, NutrientStatus, Nutrients,
    RainfallEvent, SoilClass, WeatherSample,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::WeatherGateway;
use crate::store::{CycleFlags, CycleStore};

/// Parameters for starting a new cycle
#[derive(Debug, Clone)]
pub struct StartCycleRequest {
    pub owner_id: Uuid,
    pub crop: String,
    pub soil_class: SoilClass,
    pub coordinates: GpsCoordinates,
    pub initial_nutrients: Nutrients,
    /// Defaults to the crop's typical cycle length
    pub duration_days: Option<i64>,
    /// Defaults to now; earlier values backfill a cycle already in progress
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of folding one weather observation into a cycle
#[derive(Debug, Clone)]
pub struct WeatherCheckOutcome {
    pub cycle_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub rainfall_mm: f64,
    /// False when the sample was stale and ignored
    pub applied: bool,
    /// Leaching loss, present only when rainfall was recorded
    pub rainfall_loss: Option<Nutrients>,
    pub current: Nutrients,
    pub status: NutrientStatus,
    pub low_nutrient_warning: bool,
    pub completion_due: bool,
}

/// Full picture of one cycle for reporting
#[derive(Debug, Clone)]
pub struct CycleStatusReport {
    pub cycle: Cycle,
    pub nutrients: NutrientState,
    pub status: NutrientStatus,
    pub progress: CycleProgress,
    pub rainfall_events: Vec<RainfallEvent>,
}

/// The cycle engine
pub struct CycleService {
    store: Arc<dyn CycleStore>,
    gateway: Arc<dyn WeatherGateway>,
    model: NutrientModel,
    gateway_timeout: Duration,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CycleService {
    pub fn new(
        store: Arc<dyn CycleStore>,
        gateway: Arc<dyn WeatherGateway>,
        model: NutrientModel,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            model,
            gateway_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &NutrientModel {
        &self.model
    }

    async fn lock_for(&self, cycle_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(cycle_id).or_default())
    }

    async fn drop_lock(&self, cycle_id: Uuid) {
        let mut locks = self.locks.lock().await;
        locks.remove(&cycle_id);
    }

    /// Start a new cycle for an owner.
    ///
    /// Fails if the crop is unknown, any input is out of range, or the owner
    /// already has an active cycle.
    pub async fn start_cycle(
        &self,
        request: StartCycleRequest,
    ) -> AppResult<(Cycle, NutrientState)> {
        validate_nutrients(&request.initial_nutrients)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        validate_coordinates(&request.coordinates)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let crop = request.crop.trim().to_lowercase();
        let profile: CropProfile = *self.model.crop_profile(&crop)?;

        let duration_days = request
            .duration_days
            .unwrap_or(profile.typical_cycle_days);
        validate_duration_days(duration_days)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        if let Some(existing) = self
            .store
            .get_active_cycle_for_owner(request.owner_id)
            .await?
        {
            tracing::warn!(
                owner_id = %request.owner_id,
                existing_cycle = %existing.id,
                "rejected start: owner already has an active cycle"
            );
            return Err(AppError::CycleAlreadyActive(request.owner_id));
        }

        let now = Utc::now();
        let started_at = request.started_at.unwrap_or(now);
        let cycle = Cycle {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            crop,
            soil_class: request.soil_class,
            coordinates: request.coordinates,
            started_at,
            planned_duration_days: duration_days,
            status: CycleStatus::Active,
            low_nutrient_warning: false,
            completion_due: false,
            last_weather_check: None,
            completed_at: None,
            completion_reason: None,
            created_at: now,
        };
        let state = NutrientState::opening(cycle.id, request.initial_nutrients, started_at);

        self.store.create_cycle(&cycle, &state).await?;

        tracing::info!(
            cycle_id = %cycle.id,
            owner_id = %cycle.owner_id,
            crop = %cycle.crop,
            soil = %cycle.soil_class,
            duration_days,
            "started crop cycle"
        );
        Ok((cycle, state))
    }

    /// Fold one weather observation into a cycle's nutrient ledger.
    ///
    /// Stale samples (observed at or before the newest sample already
    /// applied) are ignored. Uptake accrues up to the observation time,
    /// capped at the planned cycle end; rainfall then leaches against the
    /// post-uptake levels and is recorded as an event.
    pub async fn apply_weather_sample(
        &self,
        cycle_id: Uuid,
        sample: WeatherSample,
    ) -> AppResult<WeatherCheckOutcome> {
        validate_rainfall_mm(sample.rainfall_mm)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let lock = self.lock_for(cycle_id).await;
        let _guard = lock.lock().await;

        let cycle = self.store.get_cycle(cycle_id).await?;
        if !cycle.is_active() {
            return Err(AppError::CycleNotActive(cycle_id));
        }
        let mut state = self.store.get_nutrient_state(cycle_id).await?;

        if let Some(last) = state.last_sample_at {
            if sample.observed_at <= last {
                tracing::warn!(
                    cycle_id = %cycle_id,
                    observed_at = %sample.observed_at,
                    last_sample_at = %last,
                    "ignoring stale weather sample"
                );
                let status = self.model.evaluate(state.current);
                return Ok(WeatherCheckOutcome {
                    cycle_id,
                    observed_at: sample.observed_at,
                    rainfall_mm: sample.rainfall_mm,
                    applied: false,
                    rainfall_loss: None,
                    current: state.current,
                    status,
                    low_nutrient_warning: cycle.low_nutrient_warning,
                    completion_due: cycle.completion_due,
                });
            }
        }

        let profile = *self.model.crop_profile(&cycle.crop)?;
        let now = Utc::now();

        Self::accrue_uptake(&cycle, &mut state, sample.observed_at, &profile);

        let rainfall_loss = if sample.has_rainfall() {
            let loss = self
                .model
                .rainfall_loss(sample.rainfall_mm, cycle.soil_class, state.current);
            Some(loss)
        } else {
            None
        };

        // The after-snapshot is taken from the ledger itself, not recomputed
        let event = rainfall_loss.map(|loss| {
            let before = state.current;
            state.apply_rainfall(loss);
            RainfallEvent {
                id: Uuid::new_v4(),
                cycle_id,
                observed_at: sample.observed_at,
                rainfall_mm: sample.rainfall_mm,
                soil_class: cycle.soil_class,
                nutrients_before: before,
                loss,
                nutrients_after: state.current,
                recorded_at: now,
            }
        });

        state.last_sample_at = Some(sample.observed_at);
        state.updated_at = now;

        let status = self.model.evaluate(state.current);
        let low_nutrient_warning = cycle.low_nutrient_warning || status.needs_retest;
        let completion_due = cycle.is_past_duration(sample.observed_at);
        let flags = CycleFlags {
            low_nutrient_warning,
            completion_due,
            last_weather_check: Some(now),
        };

        match &event {
            Some(event) => {
                self.store
                    .append_rainfall_event(event, &state, &flags)
                    .await?;
                tracing::info!(
                    cycle_id = %cycle_id,
                    rainfall_mm = sample.rainfall_mm,
                    loss = %event.loss,
                    current = %state.current,
                    "recorded rainfall event"
                );
            }
            None => {
                self.store.update_nutrient_state(&state, &flags).await?;
            }
        }

        if low_nutrient_warning && !cycle.low_nutrient_warning {
            tracing::warn!(
                cycle_id = %cycle_id,
                overall = %status.overall,
                current = %state.current,
                "nutrient levels dropped below the warning band"
            );
        }

        Ok(WeatherCheckOutcome {
            cycle_id,
            observed_at: sample.observed_at,
            rainfall_mm: sample.rainfall_mm,
            applied: true,
            rainfall_loss,
            current: state.current,
            status,
            low_nutrient_warning,
            completion_due,
        })
    }

    /// Poll the weather gateway for a cycle's location and fold the
    /// observation in
    pub async fn check_weather(&self, cycle_id: Uuid) -> AppResult<WeatherCheckOutcome> {
        let cycle = self.store.get_cycle(cycle_id).await?;
        if !cycle.is_active() {
            return Err(AppError::CycleNotActive(cycle_id));
        }

        let sample = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.current_weather(cycle.coordinates),
        )
        .await
        .map_err(|_| AppError::GatewayTimeout)??;

        self.apply_weather_sample(cycle_id, sample).await
    }

    /// Accrue linear crop uptake up to `through`, never past the planned end
    /// and never over an interval already applied
    fn accrue_uptake(
        cycle: &Cycle,
        state: &mut NutrientState,
        through: DateTime<Utc>,
        profile: &CropProfile,
    ) {
        let planned_end = cycle.planned_end();
        let through = through.min(planned_end);
        if through <= state.uptake_applied_through {
            return;
        }
        let total_secs = (planned_end - cycle.started_at).num_seconds();
        if total_secs <= 0 {
            return;
        }
        let delta_secs = (through - state.uptake_applied_through).num_seconds();
        let fraction = delta_secs as f64 / total_secs as f64;
        state.apply_uptake(profile.total_uptake.scale(fraction), through);
    }

    /// Complete a cycle.
    ///
    /// Any uptake still outstanding is accrued first, so a full-length cycle
    /// reports the crop's full-table uptake. `Elapsed` completions are
    /// idempotent: completing an already completed cycle is a no-op that
    /// returns the recorded result. Manual completion of a completed cycle is
    /// an error.
    pub async fn complete_cycle(
        &self,
        cycle_id: Uuid,
        reason: CompletionReason,
    ) -> AppResult<CompletionResult> {
        let lock = self.lock_for(cycle_id).await;
        let _guard = lock.lock().await;

        let cycle = self.store.get_cycle(cycle_id).await?;
        let mut state = self.store.get_nutrient_state(cycle_id).await?;

        if cycle.status == CycleStatus::Completed {
            if reason == CompletionReason::Manual {
                return Err(AppError::CycleNotActive(cycle_id));
            }
            tracing::debug!(cycle_id = %cycle_id, "cycle already completed, returning recorded result");
            return Ok(self.completion_result(&cycle, &state, cycle.completed_at, None));
        }

        let completed_at = Utc::now();

        let profile = *self.model.crop_profile(&cycle.crop)?;
        let applied_through = state.uptake_applied_through;
        Self::accrue_uptake(&cycle, &mut state, completed_at, &profile);
        if state.uptake_applied_through > applied_through {
            state.updated_at = completed_at;
            let status = self.model.evaluate(state.current);
            let flags = CycleFlags {
                low_nutrient_warning: cycle.low_nutrient_warning || status.needs_retest,
                completion_due: cycle.completion_due,
                last_weather_check: None,
            };
            self.store.update_nutrient_state(&state, &flags).await?;
        }

        self.store
            .complete_cycle(cycle_id, completed_at, reason)
            .await?;
        drop(_guard);
        self.drop_lock(cycle_id).await;

        let result = self.completion_result(&cycle, &state, Some(completed_at), Some(reason));
        tracing::info!(
            cycle_id = %cycle_id,
            reason = reason.as_str(),
            final_nutrients = %state.current,
            can_continue = result.can_continue,
            "completed crop cycle"
        );
        Ok(result)
    }

    fn completion_result(
        &self,
        cycle: &Cycle,
        state: &NutrientState,
        completed_at: Option<DateTime<Utc>>,
        reason: Option<CompletionReason>,
    ) -> CompletionResult {
        CompletionResult {
            cycle_id: cycle.id,
            reason: reason
                .or(cycle.completion_reason)
                .unwrap_or(CompletionReason::Elapsed),
            completed_at: completed_at.unwrap_or_else(Utc::now),
            final_nutrients: state.current,
            summary: DepletionSummary {
                crop_uptake: state.uptake_loss,
                rainfall_loss: state.rainfall_loss,
                total_depletion: state.total_depletion(),
            },
            can_continue: self.model.can_continue(state.current),
        }
    }

    pub async fn get_active_cycle(&self, owner_id: Uuid) -> AppResult<Option<Cycle>> {
        self.store.get_active_cycle_for_owner(owner_id).await
    }

    pub async fn list_active_cycles(&self) -> AppResult<Vec<Cycle>> {
        self.store.list_active_cycles().await
    }

    /// All cycles for an owner, newest first
    pub async fn list_history(&self, owner_id: Uuid) -> AppResult<Vec<Cycle>> {
        self.store.list_cycles_for_owner(owner_id).await
    }

    pub async fn get_cycle_status(&self, cycle_id: Uuid) -> AppResult<CycleStatusReport> {
        let cycle = self.store.get_cycle(cycle_id).await?;
        let nutrients = self.store.get_nutrient_state(cycle_id).await?;
        let rainfall_events = self.store.list_rainfall_events(cycle_id).await?;

        let as_of = cycle.completed_at.unwrap_or_else(Utc::now);
        let status = self.model.evaluate(nutrients.current);
        let progress = cycle.progress(as_of);

        Ok(CycleStatusReport {
            cycle,
            nutrients,
            status,
            progress,
            rainfall_events,
        })
    }
}
