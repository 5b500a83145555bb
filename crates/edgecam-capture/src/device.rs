use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edgecam_core::{CaptureError, LensFacing, PixelFormat, Plane, RawFrame, Resolution};

// ── Device description ────────────────────────────────────────────────────────

/// An inclusive frame-rate range advertised by a device, in frames/second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    /// Fallback when no advertised range can sustain 24 fps.
    pub const FIXED_30: Self = Self { min: 30, max: 30 };

    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

impl std::fmt::Display for FpsRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub facing: LensFacing,
    pub fps_ranges: Vec<FpsRange>,
}

// ── Capture request ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusMode {
    ContinuousPicture,
}

/// Repeating preview request submitted when the session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub resolution: Resolution,
    pub fps_range: FpsRange,
    pub autofocus: AutofocusMode,
    pub auto_exposure: bool,
}

impl CaptureRequest {
    /// Preview settings: continuous-picture autofocus, auto exposure on.
    pub fn preview(resolution: Resolution, fps_range: FpsRange) -> Self {
        Self {
            resolution,
            fps_range,
            autofocus: AutofocusMode::ContinuousPicture,
            auto_exposure: true,
        }
    }
}

// ── Images ────────────────────────────────────────────────────────────────────

/// A device-owned planar image. Handed to the worker by
/// [`CameraDevice::next_image`] and returned with [`CameraDevice::release`].
#[derive(Debug)]
pub struct PlanarImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub row_stride: usize,
    pub pixel_stride: usize,
    pub data: Vec<u8>,
    pub timestamp: Duration,
    /// Sensor sequence number, increasing per captured image.
    pub sequence: u64,
}

impl PlanarImage {
    /// Borrowed view of the luma plane, valid while the image is held.
    pub fn as_raw_frame(&self) -> RawFrame<'_> {
        RawFrame {
            width: self.width,
            height: self.height,
            format: self.format,
            luma: Plane::new(&self.data, self.row_stride, self.pixel_stride),
            timestamp: self.timestamp,
        }
    }
}

// ── StopSignal ────────────────────────────────────────────────────────────────

/// Shared flag raised when the session wants delivery to end.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── CameraDevice ──────────────────────────────────────────────────────────────

/// A capture device driven entirely from the capture worker thread.
pub trait CameraDevice: Send + 'static {
    fn info(&self) -> &DeviceInfo;

    /// Open the device and start the repeating request. Once `stop` is
    /// raised, [`next_image`](Self::next_image) must return `Ok(None)`
    /// promptly.
    fn open(&mut self, request: &CaptureRequest, stop: StopSignal) -> Result<(), CaptureError>;

    /// Block until the next image is available. `Ok(None)` means the stream
    /// ended (stop requested or device gone).
    fn next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError>;

    /// Next already-queued image, without blocking.
    fn try_next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError>;

    /// Give an image's storage back to the device.
    fn release(&mut self, image: PlanarImage);

    /// Stop streaming and release the device. Idempotent.
    fn close(&mut self);
}

impl<D: CameraDevice + ?Sized> CameraDevice for Box<D> {
    fn info(&self) -> &DeviceInfo {
        (**self).info()
    }

    fn open(&mut self, request: &CaptureRequest, stop: StopSignal) -> Result<(), CaptureError> {
        (**self).open(request, stop)
    }

    fn next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
        (**self).next_image()
    }

    fn try_next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
        (**self).try_next_image()
    }

    fn release(&mut self, image: PlanarImage) {
        (**self).release(image)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
