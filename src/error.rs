//! Error handling for Mixgraph
//!
//! Bad track or clip *data* never surfaces here: the graph compiler silences
//! what it cannot play. Errors are reserved for lifecycle, I/O and decoding.

use thiserror::Error;

/// Result type alias for Mixgraph operations
pub type Result<T> = std::result::Result<T, MixgraphError>;

/// Main error type for Mixgraph operations
#[derive(Error, Debug)]
pub enum MixgraphError {
    // Lifecycle Errors
    #[error("Audio output initialization failed: {reason}")]
    Initialization { reason: String },

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine has been disposed")]
    Disposed,

    // Source Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to fetch '{key}': {reason}")]
    Fetch {
        key: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Decode Errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Collaborator Errors
    #[error("Renderer error: {reason}")]
    Renderer { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MixgraphError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MixgraphError::Initialization { .. } => "INITIALIZATION_FAILED",
            MixgraphError::NotInitialized => "NOT_INITIALIZED",
            MixgraphError::Disposed => "DISPOSED",
            MixgraphError::FileNotFound { .. } => "FILE_NOT_FOUND",
            MixgraphError::Fetch { .. } => "FETCH_FAILED",
            MixgraphError::InvalidAudio { .. } => "INVALID_AUDIO",
            MixgraphError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MixgraphError::EmptyAudio => "EMPTY_AUDIO",
            MixgraphError::Renderer { .. } => "RENDERER_ERROR",
            MixgraphError::Config { .. } => "CONFIG_ERROR",
            MixgraphError::Io(_) => "IO_ERROR",
            MixgraphError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MixgraphError::Initialization { .. }
                | MixgraphError::NotInitialized
                | MixgraphError::Fetch { .. }
                | MixgraphError::FileNotFound { .. }
                | MixgraphError::Renderer { .. }
                | MixgraphError::Io(_)
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MixgraphError::Initialization { .. } => vec![
                "Check that an audio output device is available",
                "Some platforms only allow audio after a user gesture - retry from one",
            ],
            MixgraphError::NotInitialized => vec!["Call initialize() before using the engine"],
            MixgraphError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            MixgraphError::Fetch { .. } => vec![
                "Check network connectivity",
                "Retry the load - nothing was cached for this key",
            ],
            MixgraphError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "The file may be corrupted - try re-exporting from source",
            ],
            MixgraphError::UnsupportedFormat { .. } => vec![
                "Convert to a mono or stereo WAV file",
                "Supported sample formats: 8/16/24/32-bit integer, 32-bit float",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MixgraphError::FileNotFound {
            path: "kick.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert_eq!(MixgraphError::Disposed.error_code(), "DISPOSED");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = MixgraphError::Initialization {
            reason: "no device".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
        assert!(!MixgraphError::EmptyAudio.is_recoverable());
    }

    #[test]
    fn test_display_includes_key() {
        let err = MixgraphError::Fetch {
            key: "vox".to_string(),
            reason: "timeout".to_string(),
            source: None,
        };
        assert_eq!(err.to_string(), "Failed to fetch 'vox': timeout");
    }
}
