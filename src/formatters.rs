//! Display strings for session metrics
//!
//! Every function here is total: zero, negative, NaN and infinite inputs map
//! to a fixed placeholder instead of leaking `NaN` or `inf` into the UI.

use crate::metrics;

/// Placeholder shown while pace is undefined
pub const PACE_PLACEHOLDER: &str = "00:00";

/// Largest displayable pace, 99:59 per km
const MAX_PACE_SECONDS: i64 = 99 * 60 + 59;

/// Elapsed time as zero-padded `HH:MM:SS`; negative input renders as zero
pub fn format_duration(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Whole meters below one kilometer, kilometers with two decimals above
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() || meters <= 0.0 {
        return "0 m".to_string();
    }
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Average pace of a distance covered in a duration, as `MM:SS` per km
pub fn format_pace(distance_meters: f64, duration_ms: i64) -> String {
    match metrics::average_pace(distance_meters, duration_ms) {
        Some(seconds_per_km) => format_pace_seconds(seconds_per_km),
        None => PACE_PLACEHOLDER.to_string(),
    }
}

/// Seconds per kilometer as `MM:SS`, capped at `99:59`
pub fn format_pace_seconds(seconds_per_km: f64) -> String {
    if !seconds_per_km.is_finite() || seconds_per_km <= 0.0 {
        return PACE_PLACEHOLDER.to_string();
    }

    let total = if seconds_per_km >= MAX_PACE_SECONDS as f64 {
        MAX_PACE_SECONDS
    } else {
        (seconds_per_km.round() as i64).min(MAX_PACE_SECONDS)
    };

    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Optional pace, undefined renders as the placeholder
pub fn format_optional_pace(seconds_per_km: Option<f64>) -> String {
    seconds_per_km
        .map(format_pace_seconds)
        .unwrap_or_else(|| PACE_PLACEHOLDER.to_string())
}

/// Elevation gain in meters with two decimals
pub fn format_elevation_gain(meters: f64) -> String {
    if !meters.is_finite() || meters <= 0.0 {
        return "0.00 m".to_string();
    }
    format!("{:.2} m", meters)
}

pub fn format_calories(kcal: f64) -> String {
    if !kcal.is_finite() || kcal <= 0.0 {
        return "0 Cal".to_string();
    }
    format!("{:.0} Cal", kcal)
}

/// Heart rate in bpm, `-` when no sample was taken
pub fn format_heart_rate(bpm: u32) -> String {
    if bpm == 0 {
        "-".to_string()
    } else {
        format!("{} bpm", bpm)
    }
}
