//! Unified error hierarchy for TrackRS
//!
//! Session control errors, persistence failures and import problems share one
//! top-level type so the UI layer can map any of them to a user message.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::SessionStatus;

/// Top-level error type for all TrackRS operations
#[derive(Debug, Error)]
pub enum TrackRsError {
    /// A session control was requested from a status that forbids it
    #[error("Cannot {operation} while session is {from}")]
    InvalidTransition {
        operation: &'static str,
        from: SessionStatus,
    },

    /// Location access was not granted
    #[error("Location permission denied")]
    PermissionDenied,

    /// The finalized activity could not be stored
    #[error("Persistence error: {0}")]
    Persistence(#[from] DatabaseError),

    /// Track file import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Activity store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Activity not found: {0}")]
    NotFound(String),

    /// Store refused the write (offline backend, quota, injected failure)
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Track file import errors
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Parse error in {format}: {reason}")]
    Parse { format: String, reason: String },

    #[error("Track contains no usable points")]
    EmptyTrack,
}

/// Result type alias for TrackRS operations
pub type Result<T> = std::result::Result<T, TrackRsError>;

impl TrackRsError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackRsError::Persistence(DatabaseError::Unavailable { .. })
                | TrackRsError::Persistence(DatabaseError::Sqlite(_))
                | TrackRsError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrackRsError::InvalidTransition { .. } => ErrorSeverity::Info,
            TrackRsError::PermissionDenied => ErrorSeverity::Warning,
            TrackRsError::Persistence(DatabaseError::NotFound(_)) => ErrorSeverity::Warning,
            TrackRsError::Persistence(_) => ErrorSeverity::Error,
            TrackRsError::Import(_) => ErrorSeverity::Warning,
            TrackRsError::Configuration(_) => ErrorSeverity::Error,
            TrackRsError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            TrackRsError::PermissionDenied => {
                "Location permission is required to record your activity.".to_string()
            }
            TrackRsError::Persistence(DatabaseError::NotFound(id)) => {
                format!("No activity with id {}", id)
            }
            TrackRsError::Persistence(_) => {
                "Your activity could not be saved. It is kept on this device; try saving again."
                    .to_string()
            }
            TrackRsError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find track file: {}", path.display())
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the operation
    Error,
    /// Recoverable, needs user attention
    Warning,
    /// Ignorable no-op
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
