use super::ExportError;
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use std::path::Path;

use crate::models::GeoSample;

#[derive(Serialize)]
struct TrackPointRow {
    time: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    accuracy: Option<f64>,
}

impl From<&GeoSample> for TrackPointRow {
    fn from(sample: &GeoSample) -> Self {
        let time = DateTime::from_timestamp_millis(sample.timestamp)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| sample.timestamp.to_string());
        Self {
            time,
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            accuracy: sample.horizontal_accuracy,
        }
    }
}

/// Export a track path as CSV readable by the track importer
pub fn export_track_points<P: AsRef<Path>>(
    path: &[GeoSample],
    output_path: P,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(output_path)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    for sample in path {
        writer
            .serialize(TrackPointRow::from(sample))
            .map_err(|e| ExportError::SerializationError(e.to_string()))?;
    }
    writer.flush()?;

    Ok(())
}
