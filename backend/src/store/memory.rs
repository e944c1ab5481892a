//! In-memory store used by tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{CompletionReason, Cycle, CycleStatus, NutrientState, RainfallEvent};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{CycleFlags, CycleStore};

#[derive(Default)]
struct Inner {
    cycles: HashMap<Uuid, Cycle>,
    states: HashMap<Uuid, NutrientState>,
    events: HashMap<Uuid, Vec<RainfallEvent>>,
}

/// Process-local `CycleStore` backed by hash maps
#[derive(Default)]
pub struct MemoryCycleStore {
    inner: RwLock<Inner>,
}

impl MemoryCycleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CycleStore for MemoryCycleStore {
    async fn create_cycle(&self, cycle: &Cycle, state: &NutrientState) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.cycles.contains_key(&cycle.id) {
            return Err(AppError::Internal(format!(
                "cycle {} already exists",
                cycle.id
            )));
        }
        // Same guarantee as the partial unique index in Postgres
        if cycle.status == CycleStatus::Active
            && inner
                .cycles
                .values()
                .any(|c| c.owner_id == cycle.owner_id && c.status == CycleStatus::Active)
        {
            return Err(AppError::CycleAlreadyActive(cycle.owner_id));
        }
        inner.cycles.insert(cycle.id, cycle.clone());
        inner.states.insert(cycle.id, state.clone());
        inner.events.insert(cycle.id, Vec::new());
        Ok(())
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> AppResult<Cycle> {
        let inner = self.inner.read().await;
        inner
            .cycles
            .get(&cycle_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("cycle {}", cycle_id)))
    }

    async fn get_active_cycle_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Cycle>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cycles
            .values()
            .find(|c| c.owner_id == owner_id && c.status == CycleStatus::Active)
            .cloned())
    }

    async fn list_active_cycles(&self) -> AppResult<Vec<Cycle>> {
        let inner = self.inner.read().await;
        let mut cycles: Vec<Cycle> = inner
            .cycles
            .values()
            .filter(|c| c.status == CycleStatus::Active)
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.started_at);
        Ok(cycles)
    }

    async fn list_cycles_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<Cycle>> {
        let inner = self.inner.read().await;
        let mut cycles: Vec<Cycle> = inner
            .cycles
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        cycles.sort_by_key(|c| std::cmp::Reverse(c.started_at));
        Ok(cycles)
    }

    async fn get_nutrient_state(&self, cycle_id: Uuid) -> AppResult<NutrientState> {
        let inner = self.inner.read().await;
        inner
            .states
            .get(&cycle_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("nutrient state for cycle {}", cycle_id)))
    }

    async fn list_rainfall_events(&self, cycle_id: Uuid) -> AppResult<Vec<RainfallEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.get(&cycle_id).cloned().unwrap_or_default())
    }

    async fn update_nutrient_state(
        &self,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let cycle = inner
            .cycles
            .get_mut(&state.cycle_id)
            .ok_or_else(|| AppError::NotFound(format!("cycle {}", state.cycle_id)))?;
        if cycle.status != CycleStatus::Active {
            return Err(AppError::CycleNotActive(state.cycle_id));
        }
        cycle.low_nutrient_warning = flags.low_nutrient_warning;
        cycle.completion_due = flags.completion_due;
        if flags.last_weather_check.is_some() {
            cycle.last_weather_check = flags.last_weather_check;
        }
        inner.states.insert(state.cycle_id, state.clone());
        Ok(())
    }

    async fn append_rainfall_event(
        &self,
        event: &RainfallEvent,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let cycle = inner
            .cycles
            .get_mut(&event.cycle_id)
            .ok_or_else(|| AppError::NotFound(format!("cycle {}", event.cycle_id)))?;
        if cycle.status != CycleStatus::Active {
            return Err(AppError::CycleNotActive(event.cycle_id));
        }
        cycle.low_nutrient_warning = flags.low_nutrient_warning;
        cycle.completion_due = flags.completion_due;
        if flags.last_weather_check.is_some() {
            cycle.last_weather_check = flags.last_weather_check;
        }
        inner.states.insert(state.cycle_id, state.clone());
        inner.events.entry(event.cycle_id).or_default().push(event.clone());
        Ok(())
    }

    async fn complete_cycle(
        &self,
        cycle_id: Uuid,
        completed_at: DateTime<Utc>,
        reason: CompletionReason,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let cycle = inner
            .cycles
            .get_mut(&cycle_id)
            .ok_or_else(|| AppError::NotFound(format!("cycle {}", cycle_id)))?;
        if cycle.status != CycleStatus::Active {
            return Err(AppError::CycleNotActive(cycle_id));
        }
        cycle.status = CycleStatus::Completed;
        cycle.completed_at = Some(completed_at);
        cycle.completion_reason = Some(reason);
        cycle.completion_due = false;
        Ok(())
    }
}
