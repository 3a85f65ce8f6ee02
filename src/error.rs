// Error types for the mood detector

use crate::loader::ModelKind;
use crate::session::Stage;
use thiserror::Error;

/// Main error type for the mood detector
#[derive(Debug, Error)]
pub enum MoodDetectorError {
    #[error("Model loading failed for {model}: {reason}")]
    ModelLoad { model: ModelKind, reason: String },

    #[error("Camera access failed: {0}")]
    CameraAccess(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Mood report failed: {0}")]
    ReportTransport(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("{stage} timed out")]
    Timeout { stage: Stage },

    #[error("{stage} was cancelled")]
    Cancelled { stage: Stage },

    #[error("A mood detection session is already running")]
    SessionBusy,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for mood detector operations
pub type Result<T> = std::result::Result<T, MoodDetectorError>;

impl From<reqwest::Error> for MoodDetectorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            MoodDetectorError::ReportTransport(format!("server returned {status}"))
        } else if err.is_decode() {
            MoodDetectorError::ReportTransport(format!("malformed response: {err}"))
        } else {
            MoodDetectorError::ReportTransport(err.to_string())
        }
    }
}

impl From<serde_yaml::Error> for MoodDetectorError {
    fn from(err: serde_yaml::Error) -> Self {
        MoodDetectorError::Config(err.to_string())
    }
}

// Conversion from nokhwa errors
#[cfg(feature = "native")]
impl From<nokhwa::NokhwaError> for MoodDetectorError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                MoodDetectorError::CameraAccess(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::OpenStreamError(error) => {
                MoodDetectorError::CameraAccess(format!("Stream: {error}"))
            }
            _ => MoodDetectorError::CameraAccess(err.to_string()),
        }
    }
}

// Conversion from ONNX Runtime errors
#[cfg(feature = "native")]
impl From<ort::Error> for MoodDetectorError {
    fn from(err: ort::Error) -> Self {
        MoodDetectorError::Inference(err.to_string())
    }
}
