pub mod config;
pub mod errors;
pub mod types;

pub use config::{CountPolicy, EdgecamConfig, ProcessorKind, RenderMode};
pub use errors::{CaptureError, EdgecamError, ProcessError};
pub use types::*;
