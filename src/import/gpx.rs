use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::ImportError;
use crate::import::{has_extension, TrackImporter};
use crate::models::RawLocation;

/// GPX track reader.
///
/// Track points of every track and segment are read in document order.
/// Points without a time keep `timestamp: None` and are stamped on arrival.
pub struct GpxImporter;

impl GpxImporter {
    pub fn new() -> Self {
        Self
    }

    /// Parse GPX content from any reader
    pub fn read_track<R: Read>(reader: R) -> Result<Vec<RawLocation>, ImportError> {
        let gpx = gpx::read(reader).map_err(|e| parse_error(e.to_string()))?;

        let mut track = Vec::new();
        for trk in gpx.tracks {
            for segment in trk.segments {
                for point in segment.points {
                    let timestamp = match point.time {
                        Some(time) => {
                            let iso = time.format().map_err(|e| parse_error(e.to_string()))?;
                            let utc = DateTime::parse_from_rfc3339(&iso)
                                .map_err(|e| parse_error(e.to_string()))?
                                .with_timezone(&Utc);
                            Some(utc.timestamp_millis())
                        }
                        None => None,
                    };

                    let position = point.point();
                    track.push(RawLocation {
                        latitude: position.y(),
                        longitude: position.x(),
                        altitude: point.elevation,
                        accuracy: None,
                        timestamp,
                    });
                }
            }
        }

        Ok(track)
    }
}

impl Default for GpxImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_error(reason: String) -> ImportError {
    ImportError::Parse {
        format: "GPX".to_string(),
        reason,
    }
}

impl TrackImporter for GpxImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, "gpx")
    }

    fn import_track(&self, file_path: &Path) -> Result<Vec<RawLocation>, ImportError> {
        let file = File::open(file_path).map_err(|_| ImportError::FileNotFound {
            path: file_path.to_path_buf(),
        })?;
        Self::read_track(BufReader::new(file))
    }

    fn format_name(&self) -> &'static str {
        "GPX"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trackrs-tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning run</name>
    <trkseg>
      <trkpt lat="-6.914744" lon="107.609810">
        <ele>768.0</ele>
        <time>2024-05-01T06:00:00Z</time>
      </trkpt>
      <trkpt lat="-6.914800" lon="107.610200">
        <ele>770.5</ele>
        <time>2024-05-01T06:00:10Z</time>
      </trkpt>
      <trkpt lat="-6.914900" lon="107.610600"/>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_read_track_points() {
        let track = GpxImporter::read_track(SAMPLE.as_bytes()).unwrap();
        assert_eq!(track.len(), 3);

        assert_eq!(track[0].latitude, -6.914744);
        assert_eq!(track[0].longitude, 107.609810);
        assert_eq!(track[0].altitude, Some(768.0));
        assert_eq!(track[0].timestamp, Some(1_714_543_200_000));
        assert_eq!(track[1].timestamp, Some(1_714_543_210_000));

        assert_eq!(track[2].altitude, None);
        assert_eq!(track[2].timestamp, None);
    }

    #[test]
    fn test_malformed_gpx() {
        let result = GpxImporter::read_track("<gpx><trk>".as_bytes());
        assert!(matches!(result, Err(ImportError::Parse { .. })));
    }
}
