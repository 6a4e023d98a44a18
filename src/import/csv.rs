use chrono::{DateTime, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::ImportError;
use crate::import::{has_extension, TrackImporter};
use crate::models::RawLocation;

/// Epoch numbers above this are read as milliseconds, below as seconds
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// CSV track reader with flexible column mapping
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(
            &mut column_mapping,
            "latitude",
            &["latitude", "lat", "position_lat"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "longitude",
            &["longitude", "lng", "lon", "long", "position_long"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "altitude",
            &["altitude", "alt", "elevation", "elev", "ele", "height"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "accuracy",
            &["accuracy", "horizontal_accuracy", "acc", "hacc"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "timestamp",
            &["timestamp", "time", "datetime", "date_time"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Epoch milliseconds from a date-time string or an epoch number
    fn parse_timestamp(value: &str) -> Option<i64> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc).timestamp_millis());
        }

        let formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%d/%m/%Y %H:%M:%S",
        ];
        for format in &formats {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(naive.and_utc().timestamp_millis());
            }
        }

        let number = value.parse::<f64>().ok().filter(|n| n.is_finite())?;
        if number.abs() >= EPOCH_MILLIS_THRESHOLD {
            Some(number.round() as i64)
        } else {
            Some((number * 1000.0).round() as i64)
        }
    }

    /// Parse CSV content from any reader
    pub fn read_track<R: Read>(&self, reader: R) -> Result<Vec<RawLocation>, ImportError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(parse_error)?.clone();
        let header_mapping: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (self.normalize_column_name(header), i))
            .collect();

        let (Some(&lat_idx), Some(&lon_idx)) = (
            header_mapping.get("latitude"),
            header_mapping.get("longitude"),
        ) else {
            return Err(ImportError::Parse {
                format: "CSV".to_string(),
                reason: "missing latitude/longitude columns".to_string(),
            });
        };
        let alt_idx = header_mapping.get("altitude").copied();
        let acc_idx = header_mapping.get("accuracy").copied();
        let time_idx = header_mapping.get("timestamp").copied();

        let float_at = |record: &csv::StringRecord, idx: Option<usize>| -> Option<f64> {
            idx.and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .and_then(|v| v.parse::<f64>().ok())
        };

        let mut track = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let record = result.map_err(parse_error)?;

            let (Some(latitude), Some(longitude)) = (
                float_at(&record, Some(lat_idx)),
                float_at(&record, Some(lon_idx)),
            ) else {
                debug!(row = row + 1, "Skipping row without a position");
                continue;
            };

            track.push(RawLocation {
                latitude,
                longitude,
                altitude: float_at(&record, alt_idx),
                accuracy: float_at(&record, acc_idx),
                timestamp: time_idx
                    .and_then(|i| record.get(i))
                    .and_then(Self::parse_timestamp),
            });
        }

        Ok(track)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_error(e: csv::Error) -> ImportError {
    ImportError::Parse {
        format: "CSV".to_string(),
        reason: e.to_string(),
    }
}

impl TrackImporter for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "csv")
    }

    fn import_track(&self, file_path: &Path) -> Result<Vec<RawLocation>, ImportError> {
        let file = std::fs::File::open(file_path).map_err(|_| ImportError::FileNotFound {
            path: file_path.to_path_buf(),
        })?;
        self.read_track(file)
    }

    fn format_name(&self) -> &'static str {
        "CSV"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_aliases() {
        let importer = CsvImporter::new();
        let content = "Lat,Lng,Elevation,Horizontal Accuracy,Time\n\
                       -6.9147,107.6098,768,4.5,2024-05-01T06:00:00Z\n\
                       -6.9148,107.6102,,12,2024-05-01 06:00:05\n";
        let track = importer.read_track(content.as_bytes()).unwrap();

        assert_eq!(track.len(), 2);
        assert_eq!(track[0].altitude, Some(768.0));
        assert_eq!(track[0].accuracy, Some(4.5));
        assert_eq!(track[0].timestamp, Some(1_714_543_200_000));
        assert_eq!(track[1].altitude, None);
        assert_eq!(track[1].timestamp, Some(1_714_543_205_000));
    }

    #[test]
    fn test_epoch_timestamps() {
        assert_eq!(CsvImporter::parse_timestamp("1714543200"), Some(1_714_543_200_000));
        assert_eq!(CsvImporter::parse_timestamp("1714543200500"), Some(1_714_543_200_500));
        assert_eq!(CsvImporter::parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_rows_without_position_are_skipped() {
        let importer = CsvImporter::new();
        let content = "latitude,longitude\n1.0,2.0\n,3.0\nabc,4.0\n5.0,6.0\n";
        let track = importer.read_track(content.as_bytes()).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track[1].latitude, 5.0);
        assert_eq!(track[1].timestamp, None);
    }

    #[test]
    fn test_missing_position_columns() {
        let importer = CsvImporter::new();
        let result = importer.read_track("time,altitude\n0,1\n".as_bytes());
        assert!(matches!(result, Err(ImportError::Parse { .. })));
    }
}
