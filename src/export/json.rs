use super::ExportError;
use std::io::Write;
use std::path::Path;

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<(), ExportError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, GeoSample, StoredActivity};
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_stored_activity() {
        let stored = StoredActivity {
            id: "a1".to_string(),
            activity: Activity {
                start_time: 1_000,
                end_time: 61_000,
                duration_ms: 60_000,
                distance_meters: 250.0,
                calories_kcal: 8,
                pace_string: "04:00".to_string(),
                path: vec![GeoSample::new(1.0, 2.0, 3.0, 1_000)],
                heart_rate_samples: vec![141],
                average_heart_rate_bpm: 141,
                elevation_gain_meters: 0.0,
            },
        };

        let temp_file = NamedTempFile::new().unwrap();
        export_json(&stored, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"id\": \"a1\""));
        assert!(content.contains("\"durationMs\": 60000"));
        assert!(content.contains("\"paceString\": \"04:00\""));

        let parsed: StoredActivity = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, stored);
    }
}
