//! PostgreSQL-backed `CycleStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    CompletionReason, Cycle, CycleStatus, GpsCoordinates, NutrientState, Nutrients, RainfallEvent,
    SoilClass,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{CycleFlags, CycleStore};

/// `CycleStore` backed by PostgreSQL
#[derive(Clone)]
pub struct PgCycleStore {
    pool: PgPool,
}

impl PgCycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: Uuid,
    owner_id: Uuid,
    crop: String,
    soil_class: String,
    latitude: f64,
    longitude: f64,
    started_at: DateTime<Utc>,
    planned_duration_days: i64,
    status: String,
    low_nutrient_warning: bool,
    completion_due: bool,
    last_weather_check: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    completion_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CycleRow> for Cycle {
    type Error = AppError;

    fn try_from(row: CycleRow) -> Result<Self, Self::Error> {
        let soil_class: SoilClass = row
            .soil_class
            .parse()
            .map_err(|_| AppError::Internal(format!("bad soil class in row: {}", row.soil_class)))?;
        let status: CycleStatus = row
            .status
            .parse()
            .map_err(|e: String| AppError::Internal(e))?;
        let completion_reason = row
            .completion_reason
            .map(|r| r.parse::<CompletionReason>())
            .transpose()
            .map_err(AppError::Internal)?;

        Ok(Cycle {
            id: row.id,
            owner_id: row.owner_id,
            crop: row.crop,
            soil_class,
            coordinates: GpsCoordinates::new(row.latitude, row.longitude),
            started_at: row.started_at,
            planned_duration_days: row.planned_duration_days,
            status,
            low_nutrient_warning: row.low_nutrient_warning,
            completion_due: row.completion_due,
            last_weather_check: row.last_weather_check,
            completed_at: row.completed_at,
            completion_reason,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NutrientStateRow {
    cycle_id: Uuid,
    initial_n: f64,
    initial_p: f64,
    initial_k: f64,
    current_n: f64,
    current_p: f64,
    current_k: f64,
    uptake_n: f64,
    uptake_p: f64,
    uptake_k: f64,
    rainfall_n: f64,
    rainfall_p: f64,
    rainfall_k: f64,
    uptake_applied_through: DateTime<Utc>,
    last_sample_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<NutrientStateRow> for NutrientState {
    fn from(row: NutrientStateRow) -> Self {
        NutrientState {
            cycle_id: row.cycle_id,
            initial: Nutrients::new(row.initial_n, row.initial_p, row.initial_k),
            current: Nutrients::new(row.current_n, row.current_p, row.current_k),
            uptake_loss: Nutrients::new(row.uptake_n, row.uptake_p, row.uptake_k),
            rainfall_loss: Nutrients::new(row.rainfall_n, row.rainfall_p, row.rainfall_k),
            uptake_applied_through: row.uptake_applied_through,
            last_sample_at: row.last_sample_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RainfallEventRow {
    id: Uuid,
    cycle_id: Uuid,
    observed_at: DateTime<Utc>,
    rainfall_mm: f64,
    soil_class: String,
    before_n: f64,
    before_p: f64,
    before_k: f64,
    loss_n: f64,
    loss_p: f64,
    loss_k: f64,
    after_n: f64,
    after_p: f64,
    after_k: f64,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<RainfallEventRow> for RainfallEvent {
    type Error = AppError;

    fn try_from(row: RainfallEventRow) -> Result<Self, Self::Error> {
        let soil_class: SoilClass = row
            .soil_class
            .parse()
            .map_err(|_| AppError::Internal(format!("bad soil class in row: {}", row.soil_class)))?;
        Ok(RainfallEvent {
            id: row.id,
            cycle_id: row.cycle_id,
            observed_at: row.observed_at,
            rainfall_mm: row.rainfall_mm,
            soil_class,
            nutrients_before: Nutrients::new(row.before_n, row.before_p, row.before_k),
            loss: Nutrients::new(row.loss_n, row.loss_p, row.loss_k),
            nutrients_after: Nutrients::new(row.after_n, row.after_p, row.after_k),
            recorded_at: row.recorded_at,
        })
    }
}

async fn write_nutrient_state<'e, E>(executor: E, state: &NutrientState) -> AppResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE nutrient_states
        SET current_n = $2, current_p = $3, current_k = $4,
            uptake_n = $5, uptake_p = $6, uptake_k = $7,
            rainfall_n = $8, rainfall_p = $9, rainfall_k = $10,
            uptake_applied_through = $11,
            last_sample_at = $12,
            updated_at = $13
        WHERE cycle_id = $1
        "#,
    )
    .bind(state.cycle_id)
    .bind(state.current.n)
    .bind(state.current.p)
    .bind(state.current.k)
    .bind(state.uptake_loss.n)
    .bind(state.uptake_loss.p)
    .bind(state.uptake_loss.k)
    .bind(state.rainfall_loss.n)
    .bind(state.rainfall_loss.p)
    .bind(state.rainfall_loss.k)
    .bind(state.uptake_applied_through)
    .bind(state.last_sample_at)
    .bind(state.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

// Flags only change on active cycles; the shared transaction rolls the
// paired state and event writes back when the guard misses.
async fn write_cycle_flags<'e, E>(executor: E, cycle_id: Uuid, flags: &CycleFlags) -> AppResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE crop_cycles
        SET low_nutrient_warning = $2,
            completion_due = $3,
            last_weather_check = COALESCE($4, last_weather_check)
        WHERE id = $1 AND status = 'active'
        "#,
    )
    .bind(cycle_id)
    .bind(flags.low_nutrient_warning)
    .bind(flags.completion_due)
    .bind(flags.last_weather_check)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::CycleNotActive(cycle_id));
    }
    Ok(())
}

#[async_trait]
impl CycleStore for PgCycleStore {
    async fn create_cycle(&self, cycle: &Cycle, state: &NutrientState) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO crop_cycles (
                id, owner_id, crop, soil_class, latitude, longitude,
                started_at, planned_duration_days, status,
                low_nutrient_warning, completion_due, last_weather_check,
                completed_at, completion_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(cycle.id)
        .bind(cycle.owner_id)
        .bind(&cycle.crop)
        .bind(cycle.soil_class.as_str())
        .bind(cycle.coordinates.latitude)
        .bind(cycle.coordinates.longitude)
        .bind(cycle.started_at)
        .bind(cycle.planned_duration_days)
        .bind(cycle.status.as_str())
        .bind(cycle.low_nutrient_warning)
        .bind(cycle.completion_due)
        .bind(cycle.last_weather_check)
        .bind(cycle.completed_at)
        .bind(cycle.completion_reason.map(|r| r.as_str()))
        .bind(cycle.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::CycleAlreadyActive(cycle.owner_id);
                }
            }
            AppError::DatabaseError(e)
        })?;

        sqlx::query(
            r#"
            INSERT INTO nutrient_states (
                cycle_id,
                initial_n, initial_p, initial_k,
                current_n, current_p, current_k,
                uptake_n, uptake_p, uptake_k,
                rainfall_n, rainfall_p, rainfall_k,
                uptake_applied_through, last_sample_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(state.cycle_id)
        .bind(state.initial.n)
        .bind(state.initial.p)
        .bind(state.initial.k)
        .bind(state.current.n)
        .bind(state.current.p)
        .bind(state.current.k)
        .bind(state.uptake_loss.n)
        .bind(state.uptake_loss.p)
        .bind(state.uptake_loss.k)
        .bind(state.rainfall_loss.n)
        .bind(state.rainfall_loss.p)
        .bind(state.rainfall_loss.k)
        .bind(state.uptake_applied_through)
        .bind(state.last_sample_at)
        .bind(state.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_cycle(&self, cycle_id: Uuid) -> AppResult<Cycle> {
        let row = sqlx::query_as::<_, CycleRow>(
            "SELECT * FROM crop_cycles WHERE id = $1",
        )
        .bind(cycle_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cycle {}", cycle_id)))?;

        row.try_into()
    }

    async fn get_active_cycle_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Cycle>> {
        let row = sqlx::query_as::<_, CycleRow>(
            "SELECT * FROM crop_cycles WHERE owner_id = $1 AND status = 'active'",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Cycle::try_from).transpose()
    }

    async fn list_active_cycles(&self) -> AppResult<Vec<Cycle>> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT * FROM crop_cycles WHERE status = 'active' ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Cycle::try_from).collect()
    }

    async fn list_cycles_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<Cycle>> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT * FROM crop_cycles WHERE owner_id = $1 ORDER BY started_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Cycle::try_from).collect()
    }

    async fn get_nutrient_state(&self, cycle_id: Uuid) -> AppResult<NutrientState> {
        let row = sqlx::query_as::<_, NutrientStateRow>(
            "SELECT * FROM nutrient_states WHERE cycle_id = $1",
        )
        .bind(cycle_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("nutrient state for cycle {}", cycle_id)))?;

        Ok(row.into())
    }

    async fn list_rainfall_events(&self, cycle_id: Uuid) -> AppResult<Vec<RainfallEvent>> {
        let rows = sqlx::query_as::<_, RainfallEventRow>(
            "SELECT * FROM rainfall_events WHERE cycle_id = $1 ORDER BY observed_at",
        )
        .bind(cycle_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RainfallEvent::try_from).collect()
    }

    async fn update_nutrient_state(
        &self,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        write_nutrient_state(&mut *tx, state).await?;
        write_cycle_flags(&mut *tx, state.cycle_id, flags).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_rainfall_event(
        &self,
        event: &RainfallEvent,
        state: &NutrientState,
        flags: &CycleFlags,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rainfall_events (
                id, cycle_id, observed_at, rainfall_mm, soil_class,
                before_n, before_p, before_k,
                loss_n, loss_p, loss_k,
                after_n, after_p, after_k,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(event.id)
        .bind(event.cycle_id)
        .bind(event.observed_at)
        .bind(event.rainfall_mm)
        .bind(event.soil_class.as_str())
        .bind(event.nutrients_before.n)
        .bind(event.nutrients_before.p)
        .bind(event.nutrients_before.k)
        .bind(event.loss.n)
        .bind(event.loss.p)
        .bind(event.loss.k)
        .bind(event.nutrients_after.n)
        .bind(event.nutrients_after.p)
        .bind(event.nutrients_after.k)
        .bind(event.recorded_at)
        .execute(&mut *tx)
        .await?;

        write_nutrient_state(&mut *tx, state).await?;
        write_cycle_flags(&mut *tx, event.cycle_id, flags).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn complete_cycle(
        &self,
        cycle_id: Uuid,
        completed_at: DateTime<Utc>,
        reason: CompletionReason,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE crop_cycles
            SET status = 'completed',
                completed_at = $2,
                completion_reason = $3,
                completion_due = FALSE
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(cycle_id)
        .bind(completed_at)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::CycleNotActive(cycle_id));
        }
        Ok(())
    }
}
