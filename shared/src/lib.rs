//! Shared types and models for the CropSense RINDM core
//!
//! This crate contains the pure domain layer shared between the backend
//! service and its tests: entity models, common value types, and the
//! rainfall-induced nutrient depletion model itself.

pub mod models;
pub mod nutrient_model;
pub mod types;
pub mod validation;

pub use models::*;
pub use nutrient_model::*;
pub use types::*;
pub use validation::*;
