use super::ExportError;
use chrono::DateTime;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use crate::formatters;
use crate::models::{Activity, StoredActivity};

const CARD_WIDTH: usize = 40;

/// Plain-text share card for an activity
pub fn summary_card(activity: &Activity) -> String {
    let mut card = String::new();
    let rule = "=".repeat(CARD_WIDTH);

    // Writing into a String cannot fail
    let _ = writeln!(card, "{}", rule);
    let _ = writeln!(card, "My Activity");
    if let Some(date) = DateTime::from_timestamp_millis(activity.start_time) {
        let _ = writeln!(card, "{}", date.format("%b %-d, %Y"));
    }
    let _ = writeln!(card, "{}", rule);

    let rows = [
        ("Distance", formatters::format_distance(activity.distance_meters)),
        ("Pace", format!("{} /km", activity.pace_string)),
        ("Duration", formatters::format_duration(activity.duration_ms)),
        (
            "Elevation Gain",
            formatters::format_elevation_gain(activity.elevation_gain_meters),
        ),
        (
            "Calories",
            formatters::format_calories(f64::from(activity.calories_kcal)),
        ),
        (
            "Avg Heart Rate",
            formatters::format_heart_rate(activity.average_heart_rate_bpm),
        ),
    ];
    for (label, value) in rows {
        let _ = writeln!(card, "{:<16}{:>24}", label, value);
    }

    let _ = writeln!(card, "{}", "-".repeat(CARD_WIDTH));
    let _ = writeln!(
        card,
        "{} GPS points, {} heart-rate samples",
        activity.path.len(),
        activity.heart_rate_samples.len()
    );
    card
}

/// Write the share card of a stored activity to a file
pub fn export_summary_card<P: AsRef<Path>>(
    activity: &StoredActivity,
    output_path: P,
) -> Result<(), ExportError> {
    let mut file = std::fs::File::create(output_path)?;
    writeln!(file, "Activity {}", activity.id)?;
    file.write_all(summary_card(&activity.activity).as_bytes())?;
    Ok(())
}
