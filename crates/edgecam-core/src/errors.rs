use thiserror::Error;

use crate::types::LensFacing;

#[derive(Error, Debug)]
pub enum EdgecamError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("No {facing}-facing capture device available")]
    DeviceNotFound { facing: LensFacing },

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open capture device: {reason}")]
    OpenFailed { reason: String },

    #[error("Capture session configuration failed: {reason}")]
    ConfigurationFailed { reason: String },

    #[error("Capture session already started")]
    AlreadyStarted,

    #[error("Capture session not started")]
    NotStarted,

    #[error("Capture device error: {0}")]
    Device(String),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Destination holds {actual} bytes, frame needs {required}")]
    DestinationTooSmall { required: usize, actual: usize },

    #[error("Source plane holds {actual} bytes, strides need {required}")]
    PlaneTooSmall { required: usize, actual: usize },

    #[error("Invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Kernel failed: {reason}")]
    Kernel { reason: String },
}
