//! edgecam-processor: planar luma → packed RGBA conversion.
//!
//! # Processors
//! 1. [`SobelEdge`]      : 3×3 Sobel gradient magnitude, grey output ← DEFAULT
//! 2. [`LumaPassthrough`]: luma copied to R, G and B
//!
//! # Contract
//! ```text
//! RawFrame (Y plane, row stride, pixel stride) → process() → RGBA8 destination
//! ```
//! The destination must hold at least `width * height * 4` bytes. Callers
//! size it before the call; processors re-check and refuse short buffers
//! instead of writing out of bounds.

use edgecam_core::{ProcessError, ProcessorKind, RawFrame, PACKED_BYTES_PER_PIXEL};
use tracing::info;

// ── FrameProcessor ─────────────────────────────────────────────────────────────

/// Converts one planar frame into packed RGBA, synchronously.
///
/// Runs on the capture worker for every processed frame, so implementations
/// must not block on anything but their own computation.
pub trait FrameProcessor: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, frame: &RawFrame<'_>, dst: &mut [u8]) -> Result<(), ProcessError>;
}

impl<P: FrameProcessor + ?Sized> FrameProcessor for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process(&mut self, frame: &RawFrame<'_>, dst: &mut [u8]) -> Result<(), ProcessError> {
        (**self).process(frame, dst)
    }
}

/// Shared precondition check: dimensions, source plane extent, destination
/// capacity. Returns the number of destination bytes that will be written.
pub fn check_frame(frame: &RawFrame<'_>, dst: &[u8]) -> Result<usize, ProcessError> {
    if frame.width == 0 || frame.height == 0 || frame.luma.pixel_stride == 0 {
        return Err(ProcessError::InvalidDimensions { width: frame.width, height: frame.height });
    }
    let required_src = frame.luma.required_len(frame.width, frame.height);
    if frame.luma.data.len() < required_src {
        return Err(ProcessError::PlaneTooSmall {
            required: required_src,
            actual: frame.luma.data.len(),
        });
    }
    let required_dst = frame.resolution().packed_len();
    if dst.len() < required_dst {
        return Err(ProcessError::DestinationTooSmall { required: required_dst, actual: dst.len() });
    }
    Ok(required_dst)
}

#[inline]
fn write_grey(px: &mut [u8], value: u8) {
    px[0] = value;
    px[1] = value;
    px[2] = value;
    px[3] = 0xFF;
}

// ── LumaPassthrough ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct LumaPassthrough;

impl FrameProcessor for LumaPassthrough {
    fn name(&self) -> &'static str {
        "luma"
    }

    fn process(&mut self, frame: &RawFrame<'_>, dst: &mut [u8]) -> Result<(), ProcessError> {
        let len = check_frame(frame, dst)?;
        let width = frame.width as usize;
        for (y, row) in dst[..len].chunks_exact_mut(width * PACKED_BYTES_PER_PIXEL).enumerate() {
            for (x, px) in row.chunks_exact_mut(PACKED_BYTES_PER_PIXEL).enumerate() {
                write_grey(px, frame.luma.sample(x, y));
            }
        }
        Ok(())
    }
}

// ── SobelEdge ──────────────────────────────────────────────────────────────────

/// Sobel edge detector. Magnitude is `|gx| + |gy|` clamped to 255; the
/// one-pixel border has no full neighbourhood and is written black.
#[derive(Debug, Default, Clone, Copy)]
pub struct SobelEdge;

impl FrameProcessor for SobelEdge {
    fn name(&self) -> &'static str {
        "sobel"
    }

    fn process(&mut self, frame: &RawFrame<'_>, dst: &mut [u8]) -> Result<(), ProcessError> {
        let len = check_frame(frame, dst)?;
        let width = frame.width as usize;
        let height = frame.height as usize;
        let plane = &frame.luma;
        let at = |x: usize, y: usize| plane.sample(x, y) as i32;

        for (y, row) in dst[..len].chunks_exact_mut(width * PACKED_BYTES_PER_PIXEL).enumerate() {
            for (x, px) in row.chunks_exact_mut(PACKED_BYTES_PER_PIXEL).enumerate() {
                if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
                    write_grey(px, 0);
                    continue;
                }
                let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
                let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
                let magnitude = (gx.abs() + gy.abs()).min(255) as u8;
                write_grey(px, magnitude);
            }
        }
        Ok(())
    }
}

// ── ProcessorFactory ───────────────────────────────────────────────────────────

pub struct ProcessorFactory;

impl ProcessorFactory {
    pub fn for_kind(kind: ProcessorKind) -> Box<dyn FrameProcessor> {
        let processor: Box<dyn FrameProcessor> = match kind {
            ProcessorKind::Edges => Box::new(SobelEdge),
            ProcessorKind::Luma => Box::new(LumaPassthrough),
        };
        info!("Selected frame processor: {}", processor.name());
        processor
    }
}
