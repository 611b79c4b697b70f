//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Audio capture failed on {device}: {message}")]
    Capture { device: String, message: String },

    // Calibration
    #[error("Calibration interrupted by shutdown request")]
    CalibrationInterrupted,

    // Transcription errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Preprocessing errors (recoverable; stages fall back to their input)
    #[error("Audio filter '{stage}' failed: {message}")]
    Filter { stage: &'static str, message: String },

    // Text output errors
    #[error("Text sink failed: {message}")]
    Sink { message: String },

    // WAV encoding errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SottoError {
    /// Human-readable name for a device slot, for error messages and logs.
    pub fn device_label(device: Option<usize>) -> String {
        match device {
            Some(index) => format!("device #{index}"),
            None => "default device".to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;
