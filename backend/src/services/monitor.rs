//! Periodic weather monitor
//!
//! On every tick, polls the weather gateway for each active cycle with
//! bounded concurrency, folds the observations into the nutrient ledgers,
//! and completes cycles whose planned duration has elapsed. One failing
//! cycle never affects the others.

use chrono::Utc;
use shared::CompletionReason;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::services::CycleService;

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Time between ticks
    pub interval: Duration,
    /// Maximum weather checks in flight at once
    pub max_concurrent_checks: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            max_concurrent_checks: 8,
        }
    }
}

/// What happened during one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Active cycles visited
    pub checked: usize,
    /// Checks that recorded a rainfall event
    pub rainfall_events: usize,
    /// Cycles currently carrying the low-nutrient warning
    pub warnings: usize,
    /// Cycles auto-completed because their duration elapsed
    pub completed: usize,
    /// Checks that failed (gateway or storage)
    pub failed: usize,
}

struct CheckResult {
    ok: bool,
    rained: bool,
    warned: bool,
    completed: bool,
}

/// Periodic monitor over all active cycles
pub struct MonitorScheduler {
    service: Arc<CycleService>,
    settings: MonitorSettings,
}

impl MonitorScheduler {
    pub fn new(service: Arc<CycleService>, settings: MonitorSettings) -> Self {
        Self { service, settings }
    }

    /// Run ticks until the shutdown signal flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            max_concurrent = self.settings.max_concurrent_checks,
            "weather monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.tick().await;
                    tracing::info!(
                        checked = summary.checked,
                        rainfall_events = summary.rainfall_events,
                        warnings = summary.warnings,
                        completed = summary.completed,
                        failed = summary.failed,
                        "monitor tick finished"
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("weather monitor shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Check every active cycle once
    pub async fn tick(&self) -> TickSummary {
        let cycles = match self.service.list_active_cycles().await {
            Ok(cycles) => cycles,
            Err(e) => {
                tracing::error!(error = %e, "failed to list active cycles");
                return TickSummary::default();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_checks));
        let mut handles = Vec::with_capacity(cycles.len());

        for cycle in cycles {
            let service = Arc::clone(&self.service);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return CheckResult {
                            ok: false,
                            rained: false,
                            warned: false,
                            completed: false,
                        }
                    }
                };

                let (ok, rained, warned, due) = match service.check_weather(cycle.id).await {
                    Ok(outcome) => (
                        true,
                        outcome.rainfall_loss.is_some(),
                        outcome.low_nutrient_warning,
                        outcome.completion_due,
                    ),
                    Err(e) => {
                        if e.is_gateway_failure() {
                            tracing::warn!(
                                cycle_id = %cycle.id,
                                error = %e,
                                "weather gateway unavailable, retrying next tick"
                            );
                        } else {
                            tracing::error!(
                                cycle_id = %cycle.id,
                                error = %e,
                                "weather check failed"
                            );
                        }
                        (
                            false,
                            false,
                            cycle.low_nutrient_warning,
                            cycle.is_past_duration(Utc::now()),
                        )
                    }
                };

                // Elapsed cycles complete even when the check itself failed
                let mut completed = false;
                if due {
                    match service
                        .complete_cycle(cycle.id, CompletionReason::Elapsed)
                        .await
                    {
                        Ok(_) => completed = true,
                        Err(e) => {
                            tracing::warn!(
                                cycle_id = %cycle.id,
                                error = %e,
                                "auto-completion failed"
                            );
                        }
                    }
                }

                CheckResult {
                    ok,
                    rained,
                    warned,
                    completed,
                }
            }));
        }

        let mut summary = TickSummary::default();
        for handle in handles {
            summary.checked += 1;
            match handle.await {
                Ok(result) => {
                    if !result.ok {
                        summary.failed += 1;
                    }
                    if result.rained {
                        summary.rainfall_events += 1;
                    }
                    if result.warned {
                        summary.warnings += 1;
                    }
                    if result.completed {
                        summary.completed += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "weather check task panicked");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
