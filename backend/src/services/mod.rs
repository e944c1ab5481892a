//! Business logic services

pub mod cycle;
pub mod monitor;

pub use cycle::{CycleService, CycleStatusReport, StartCycleRequest, WeatherCheckOutcome};
pub use monitor::{MonitorScheduler, MonitorSettings, TickSummary};
