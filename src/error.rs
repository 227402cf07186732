//! Error handling for Looplab
//!
//! Scheduling calls never fail; errors come from asset loading,
//! configuration and session lifecycle.

use thiserror::Error;

/// Result type alias for Looplab operations
pub type Result<T> = std::result::Result<T, LoopLabError>;

/// Main error type for Looplab operations
#[derive(Error, Debug)]
pub enum LoopLabError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Scheduling preconditions
    #[error("Invalid loop duration: {duration}s (must be > 0)")]
    InvalidDuration { duration: f64 },

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    // Session Errors
    #[error("Audio session is not ready (no user gesture has activated it yet)")]
    SessionNotReady,

    #[error("Audio session has been closed")]
    SessionClosed,

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoopLabError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LoopLabError::FileNotFound { .. } => "FILE_NOT_FOUND",
            LoopLabError::InvalidAudio { .. } => "INVALID_AUDIO",
            LoopLabError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            LoopLabError::EmptyAudio => "EMPTY_AUDIO",
            LoopLabError::InvalidDuration { .. } => "INVALID_DURATION",
            LoopLabError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            LoopLabError::SessionNotReady => "SESSION_NOT_READY",
            LoopLabError::SessionClosed => "SESSION_CLOSED",
            LoopLabError::InvalidConfig { .. } => "INVALID_CONFIG",
            LoopLabError::Io(_) => "IO_ERROR",
            LoopLabError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LoopLabError::FileNotFound { .. }
                | LoopLabError::InvalidAudio { .. }
                | LoopLabError::UnsupportedFormat { .. }
                | LoopLabError::SessionNotReady
                | LoopLabError::IndexOutOfRange { .. }
                | LoopLabError::InvalidConfig { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LoopLabError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            LoopLabError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "The file may be corrupted - try re-exporting from source",
            ],
            LoopLabError::UnsupportedFormat { .. } => vec![
                "Convert to 16/24/32-bit WAV",
                "Only mono and stereo files are supported",
            ],
            LoopLabError::SessionNotReady => {
                vec!["Activate the session from a user gesture before scheduling audio"]
            }
            LoopLabError::InvalidConfig { .. } => vec![
                "Run 'looplab default-config' to see a valid configuration",
                "Periods and durations must be positive",
            ],
            _ => vec![],
        }
    }
}
