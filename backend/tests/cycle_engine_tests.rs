//! Cycle engine integration tests
//!
//! Covers starting cycles, folding weather samples into the nutrient
//! ledger, stale-sample handling, and completion semantics.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use shared::{CompletionReason, CycleStatus, NutrientLevel, Nutrients};
use uuid::Uuid;

use common::{assert_close, rice_request, sample_at, service_with, ScriptedGateway};
use cropsense_backend::error::AppError;

#[tokio::test]
async fn start_cycle_defaults_duration_from_crop() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));

    let (cycle, state) = service
        .start_cycle(rice_request(Uuid::new_v4(), None))
        .await
        .unwrap();

    assert_eq!(cycle.planned_duration_days, 120);
    assert_eq!(cycle.status, CycleStatus::Active);
    assert!(!cycle.low_nutrient_warning);
    assert!(!cycle.completion_due);
    assert_eq!(state.current, Nutrients::new(90.0, 42.0, 43.0));
    assert_eq!(state.current, state.initial);
}

#[tokio::test]
async fn second_active_cycle_for_same_owner_is_rejected() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let owner = Uuid::new_v4();

    service.start_cycle(rice_request(owner, None)).await.unwrap();
    let err = service
        .start_cycle(rice_request(owner, None))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CycleAlreadyActive(id) if id == owner));
}

#[tokio::test]
async fn completed_cycle_frees_the_owner_for_a_new_one() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let owner = Uuid::new_v4();

    let (cycle, _) = service.start_cycle(rice_request(owner, None)).await.unwrap();
    service
        .complete_cycle(cycle.id, CompletionReason::Manual)
        .await
        .unwrap();

    assert!(service.start_cycle(rice_request(owner, None)).await.is_ok());
}

#[tokio::test]
async fn unknown_crop_is_rejected() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let mut request = rice_request(Uuid::new_v4(), None);
    request.crop = "quinoa".to_string();

    let err = service.start_cycle(request).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownCrop(_)));
}

#[tokio::test]
async fn negative_initial_nutrients_are_rejected() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let mut request = rice_request(Uuid::new_v4(), None);
    request.initial_nutrients = Nutrients::new(90.0, -1.0, 43.0);

    let err = service.start_cycle(request).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn moderate_rain_depletes_a_fresh_rice_plot() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::hours(1);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    // Sample at cycle start so no uptake has accrued yet
    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(started_at, 25.5))
        .await
        .unwrap();

    assert!(outcome.applied);
    assert_close(outcome.current.n, 78.75);
    assert_close(outcome.current.p, 37.22);
    assert_close(outcome.current.k, 37.17);

    use cropsense_backend::store::CycleStore;
    let events = store.list_rainfall_events(cycle.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rainfall_mm, 25.5);
    assert_eq!(events[0].nutrients_before, Nutrients::new(90.0, 42.0, 43.0));
    assert_eq!(events[0].nutrients_after, outcome.current);
}

#[tokio::test]
async fn dry_sample_records_no_rainfall_event() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::hours(1);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 0.0))
        .await
        .unwrap();

    assert!(outcome.applied);
    assert!(outcome.rainfall_loss.is_none());

    use cropsense_backend::store::CycleStore;
    assert!(store.list_rainfall_events(cycle.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn uptake_accrues_linearly_with_elapsed_time() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    // Rice at exactly half of its 120-day cycle
    let started_at = Utc::now() - ChronoDuration::days(60);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(started_at + ChronoDuration::days(60), 0.0))
        .await
        .unwrap();

    // Half of rice demand: 60 N, 20 P, 70 K
    assert_close(outcome.current.n, 30.0);
    assert_close(outcome.current.p, 22.0);
    assert_eq!(outcome.current.k, 0.0);
}

#[tokio::test]
async fn uptake_stops_accruing_past_the_planned_end() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::days(200);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 0.0))
        .await
        .unwrap();

    // Full demand, not 200/120 of it: 90-120 floors, 42-40 leaves 2
    assert_eq!(outcome.current.n, 0.0);
    assert_close(outcome.current.p, 2.0);
    assert_eq!(outcome.current.k, 0.0);
    assert!(outcome.completion_due);
}

#[tokio::test]
async fn stale_sample_is_ignored() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::days(1);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let observed = started_at + ChronoDuration::hours(6);
    service
        .apply_weather_sample(cycle.id, sample_at(observed, 5.0))
        .await
        .unwrap();

    use cropsense_backend::store::CycleStore;
    let state_before = store.get_nutrient_state(cycle.id).await.unwrap();

    // Same observation time, would double-count if applied
    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(observed, 5.0))
        .await
        .unwrap();
    assert!(!outcome.applied);

    // An even older observation is also ignored
    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(observed - ChronoDuration::hours(1), 50.0))
        .await
        .unwrap();
    assert!(!outcome.applied);

    let state_after = store.get_nutrient_state(cycle.id).await.unwrap();
    assert_eq!(state_before, state_after);
    assert_eq!(store.list_rainfall_events(cycle.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rainfall_event_snapshot_matches_the_stored_ledger_exactly() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    // Mid-cycle so uptake has accrued before the rain is folded in
    let started_at = Utc::now() - ChronoDuration::days(45);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 25.5))
        .await
        .unwrap();
    assert!(outcome.applied);

    use cropsense_backend::store::CycleStore;
    let state = store.get_nutrient_state(cycle.id).await.unwrap();
    let events = store.list_rainfall_events(cycle.id).await.unwrap();
    assert_eq!(events.len(), 1);

    // Bitwise equality, not approximate: the event's after-snapshot is the
    // ledger value, so re-deriving it must not introduce rounding drift
    assert_eq!(events[0].nutrients_after, state.current);
    assert_eq!(events[0].nutrients_after, outcome.current);
}

#[tokio::test]
async fn heavy_rain_raises_the_low_nutrient_warning() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::hours(2);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    // Saturating rain on loam leaches about half of everything
    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(started_at + ChronoDuration::hours(1), 150.0))
        .await
        .unwrap();

    assert!(outcome.low_nutrient_warning);
    assert!(outcome.status.needs_retest);
    assert!(outcome.status.overall <= NutrientLevel::Low);
    // Warning does not force completion
    assert!(!outcome.completion_due);

    use cropsense_backend::store::CycleStore;
    let stored = store.get_cycle(cycle.id).await.unwrap();
    assert!(stored.low_nutrient_warning);
    assert_eq!(stored.status, CycleStatus::Active);

    // The flag stays up on a later dry sample
    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 0.0))
        .await
        .unwrap();
    assert!(outcome.low_nutrient_warning);
}

#[tokio::test]
async fn sample_past_duration_flags_completion_without_completing() {
    let (service, store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::days(121);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let outcome = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 0.0))
        .await
        .unwrap();
    assert!(outcome.completion_due);

    use cropsense_backend::store::CycleStore;
    let stored = store.get_cycle(cycle.id).await.unwrap();
    assert!(stored.completion_due);
    assert_eq!(stored.status, CycleStatus::Active);
}

#[tokio::test]
async fn manual_completion_reports_the_depletion_summary() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::hours(2);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    // Sample at cycle start so the rainfall numbers stay exact
    service
        .apply_weather_sample(cycle.id, sample_at(started_at, 25.5))
        .await
        .unwrap();

    let result = service
        .complete_cycle(cycle.id, CompletionReason::Manual)
        .await
        .unwrap();

    assert_eq!(result.reason, CompletionReason::Manual);
    assert_close(result.summary.rainfall_loss.n, 11.25);
    assert_close(
        result.summary.total_depletion.n,
        result.summary.crop_uptake.n + result.summary.rainfall_loss.n,
    );
    // Two hours of a 120-day cycle accrue almost no uptake
    assert!(result.summary.crop_uptake.n < 0.2);
    assert_close(
        result.final_nutrients.n,
        90.0 - result.summary.total_depletion.n,
    );
    // K ends near 37, under the 40 continuation floor
    assert!(!result.can_continue);
}

#[tokio::test]
async fn full_length_dry_cycle_reports_the_full_table_uptake() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::days(121);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    let result = service
        .complete_cycle(cycle.id, CompletionReason::Elapsed)
        .await
        .unwrap();

    // Full rice demand and nothing from rainfall
    assert_close(result.summary.crop_uptake.n, 120.0);
    assert_close(result.summary.crop_uptake.p, 40.0);
    assert_close(result.summary.crop_uptake.k, 140.0);
    assert_eq!(result.summary.rainfall_loss, Nutrients::ZERO);
    assert_eq!(result.final_nutrients.n, 0.0);
    assert_close(result.final_nutrients.p, 2.0);
    assert!(!result.can_continue);
}

#[tokio::test]
async fn elapsed_completion_is_idempotent_but_manual_is_not() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), None))
        .await
        .unwrap();

    let first = service
        .complete_cycle(cycle.id, CompletionReason::Elapsed)
        .await
        .unwrap();
    let second = service
        .complete_cycle(cycle.id, CompletionReason::Elapsed)
        .await
        .unwrap();
    assert_eq!(first.reason, second.reason);
    assert_eq!(first.final_nutrients, second.final_nutrients);

    let err = service
        .complete_cycle(cycle.id, CompletionReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CycleNotActive(_)));
}

#[tokio::test]
async fn samples_on_completed_cycles_are_rejected() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), None))
        .await
        .unwrap();
    service
        .complete_cycle(cycle.id, CompletionReason::Manual)
        .await
        .unwrap();

    let err = service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CycleNotActive(_)));
}

#[tokio::test]
async fn status_report_combines_ledger_events_and_progress() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let started_at = Utc::now() - ChronoDuration::days(30);
    let (cycle, _) = service
        .start_cycle(rice_request(Uuid::new_v4(), Some(started_at)))
        .await
        .unwrap();

    service
        .apply_weather_sample(cycle.id, sample_at(Utc::now(), 12.0))
        .await
        .unwrap();

    let report = service.get_cycle_status(cycle.id).await.unwrap();
    assert_eq!(report.cycle.id, cycle.id);
    assert_eq!(report.rainfall_events.len(), 1);
    assert_eq!(report.progress.total_days, 120);
    assert_eq!(report.progress.days_elapsed, 30);
    assert_eq!(report.nutrients.current, report.rainfall_events[0].nutrients_after);
}

#[tokio::test]
async fn history_lists_newest_first_and_active_lookup_works() {
    let (service, _store) = service_with(ScriptedGateway::constant_rain(0.0));
    let owner = Uuid::new_v4();

    let (first, _) = service
        .start_cycle(rice_request(owner, Some(Utc::now() - ChronoDuration::days(300))))
        .await
        .unwrap();
    service
        .complete_cycle(first.id, CompletionReason::Manual)
        .await
        .unwrap();
    let (second, _) = service.start_cycle(rice_request(owner, None)).await.unwrap();

    let active = service.get_active_cycle(owner).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);

    let history = service.list_history(owner).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);
}
