//! Persistence layer for cycles, nutrient states and rainfall events

pub mod memory;
pub mod postgres;

pub use memory::MemoryCycleStore;
pub use postgres::PgCycleStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{CompletionReason, Cycle, NutrientState, RainfallEvent};
use uuid::Uuid;

use crate::error::AppResult;

/// Monitoring flags written alongside a nutrient state update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleFlags {
    pub low_nutrient_warning: bool,
    pub completion_due: bool,
    pub last_weather_check: Option<DateTime<Utc>>,
}

/// Storage contract for the cycle engine.
///
/// `append_rainfall_event` must write the event, the nutrient state and the
/// cycle flags atomically; a reader never sees an event without its state
/// update or vice versa.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Persist a new cycle together with its opening nutrient state
    async fn create_cycle(&self, cycle: &Cycle, state: &NutrientState) -> AppResult<()>;

    async fn get_cycle(&self, cycle_id: Uuid) -> AppResult<Cycle>;

    async fn get_active_cycle_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Cycle>>;

    async fn list_active_cycles(&self) -> AppResult<Vec<Cycle>>;

    /// All cycles for an owner, newest first
    async fn list_cycles_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<Cycle>>;

    async fn get_nutrient_state(&self, cycle_id: Uuid) -> AppResult<NutrientState>;

    /// Rainfall events for a cycle in observation order
    async fn list_rainfall_events(&self, cycle_id: Uuid) -> AppResult<Vec<RainfallEvent>>;

    /// Persist an updated nutrient state and cycle flags (no rainfall)
    async fn update_nutrient_state(
        &self,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()>;

    /// Persist a rainfall event, the updated nutrient state and cycle flags
    /// in one transaction
    async fn append_rainfall_event(
        &self,
        event: &RainfallEvent,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()>;

    /// Mark an active cycle completed; fails with `CycleNotActive` otherwise
    async fn complete_cycle(
        &self,
        cycle_id: Uuid,
        completed_at: DateTime<Utc>,
        reason: CompletionReason,
    ) -> AppResult<()>;
}
