//! Input validation helpers

use crate::types::{GpsCoordinates, Nutrients};

pub fn validate_nutrients(nutrients: &Nutrients) -> Result<(), &'static str> {
    if !nutrients.is_finite() {
        return Err("nutrient levels must be finite");
    }
    if !nutrients.is_non_negative() {
        return Err("nutrient levels cannot be negative");
    }
    Ok(())
}

pub fn validate_coordinates(coordinates: &GpsCoordinates) -> Result<(), &'static str> {
    if !(-90.0..=90.0).contains(&coordinates.latitude) {
        return Err("latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&coordinates.longitude) {
        return Err("longitude must be between -180 and 180");
    }
    Ok(())
}

pub fn validate_duration_days(days: i64) -> Result<(), &'static str> {
    if !(1..=730).contains(&days) {
        return Err("cycle duration must be between 1 and 730 days");
    }
    Ok(())
}

pub fn validate_rainfall_mm(rainfall_mm: f64) -> Result<(), &'static str> {
    if !rainfall_mm.is_finite() {
        return Err("rainfall must be finite");
    }
    if rainfall_mm < 0.0 {
        return Err("rainfall cannot be negative");
    }
    Ok(())
}
