//! CropSense backend: rainfall-induced nutrient depletion monitoring
//!
//! Tracks crop cycles, folds weather observations into a per-cycle nutrient
//! ledger, and runs a periodic monitor that polls weather for every active
//! cycle.

pub mod config;
pub mod error;
pub mod external;
pub mod services;
pub mod store;
