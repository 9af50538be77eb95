//! Validation utilities for model outputs and tuning parameters

use crate::models::DecisionThresholds;

/// Validate a model probability output
pub fn validate_probability(p: f64) -> Result<(), &'static str> {
    if !p.is_finite() {
        return Err("Probability must be a finite number");
    }
    if !(0.0..=1.0).contains(&p) {
        return Err("Probability must be between 0 and 1");
    }
    Ok(())
}

/// Validate and normalise a rainfall amount estimate; small negatives clamp to 0
pub fn normalize_amount(mm: f64) -> Result<f64, &'static str> {
    if !mm.is_finite() {
        return Err("Rain amount must be a finite number");
    }
    Ok(mm.max(0.0))
}

/// Validate that decision thresholds are ordered sensibly
pub fn validate_thresholds(t: &DecisionThresholds) -> Result<(), &'static str> {
    if t.critical_moisture > t.low_moisture {
        return Err("Critical moisture must not exceed low moisture");
    }
    validate_probability(t.low_rain_probability)?;
    validate_probability(t.high_rain_probability)?;
    if t.low_rain_probability > t.high_rain_probability {
        return Err("Low rain probability must not exceed high rain probability");
    }
    Ok(())
}

/// Validate window sizing: readiness can never exceed capacity
pub fn validate_window_sizes(capacity: usize, ready_at: usize) -> Result<(), &'static str> {
    if capacity < 2 {
        return Err("Window capacity must hold at least 2 readings");
    }
    if ready_at > capacity {
        return Err("Readiness threshold must not exceed window capacity");
    }
    Ok(())
}
