use std::path::Path;
use tracing::info;

use crate::error::ImportError;
use crate::models::RawLocation;

pub mod csv;
pub mod gpx;
pub mod replay;

/// Reads a recorded track file into raw location fixes
pub trait TrackImporter {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Read every fix in file order
    fn import_track(&self, file_path: &Path) -> Result<Vec<RawLocation>, ImportError>;

    fn format_name(&self) -> &'static str;
}

pub(crate) fn has_extension(file_path: &Path, expected: &str) -> bool {
    file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

/// Picks an importer by file extension
pub struct ImportManager {
    importers: Vec<Box<dyn TrackImporter>>,
}

impl ImportManager {
    pub fn new() -> Self {
        let importers: Vec<Box<dyn TrackImporter>> = vec![
            Box::new(gpx::GpxImporter::new()),
            Box::new(csv::CsvImporter::new()),
        ];

        Self { importers }
    }

    /// Import a track, auto-detecting the format
    pub fn import_track(&self, file_path: &Path) -> Result<Vec<RawLocation>, ImportError> {
        if !file_path.is_file() {
            return Err(ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            });
        }

        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                format: file_path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string()),
            })?;

        let track = importer.import_track(file_path)?;
        if track.is_empty() {
            return Err(ImportError::EmptyTrack);
        }

        info!(
            file = %file_path.display(),
            format = importer.format_name(),
            points = track.len(),
            "Track imported"
        );
        Ok(track)
    }

    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.importers.iter().any(|importer| importer.can_import(file_path))
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
