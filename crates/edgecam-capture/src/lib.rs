//! edgecam-capture: camera devices and the capture worker.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn example() -> Result<(), edgecam_core::CaptureError> {
//! use edgecam_capture::{CaptureRequest, CaptureSession, FrameSink, TestPatternCamera};
//! use edgecam_core::{LensFacing, RawFrame, Resolution};
//!
//! struct Count(u64);
//! impl FrameSink for Count {
//!     fn on_raw_frame(&mut self, _frame: &RawFrame<'_>) { self.0 += 1; }
//! }
//!
//! let camera = TestPatternCamera::new(LensFacing::Back);
//! let request = CaptureRequest::preview(Resolution::HD, camera.preferred_fps_range());
//! let (events, _events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let session = CaptureSession::start(camera, request, Count(0), events)?;
//! let (sink, stats) = session.stop()?;
//! # let _ = (sink, stats);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! sensor thread ──► bounded image queue ──► capture worker ──► FrameSink::on_raw_frame
//!      ▲                                        │  (drains to latest,
//!      └──────────── released images ◄──────────┘   drops older)
//! ```

mod device;
mod selection;
mod session;
mod test_pattern;

pub use device::{AutofocusMode, CameraDevice, CaptureRequest, DeviceInfo, FpsRange, PlanarImage, StopSignal};
pub use selection::{choose_fps_range, select_device, take_device};
pub use session::{CaptureSession, FrameSink, SessionEvent, SessionStats};
pub use test_pattern::TestPatternCamera;
