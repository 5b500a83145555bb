use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bytes per packed output pixel (RGBA8).
pub const PACKED_BYTES_PER_PIXEL: usize = 4;

// MARK: - Resolution

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const VGA: Self = Self { width: 640, height: 480 };
    pub const HD: Self = Self { width: 1280, height: 720 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size in bytes of a packed RGBA frame at this resolution.
    pub fn packed_len(&self) -> usize {
        self.width as usize * self.height as usize * PACKED_BYTES_PER_PIXEL
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - LensFacing

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Back,
    Front,
    External,
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Back => write!(f, "back"),
            Self::Front => write!(f, "front"),
            Self::External => write!(f, "external"),
        }
    }
}

// MARK: - PixelFormat

/// Sensor-side layout of a raw frame. Processors read the luma plane only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single luma plane.
    Gray8,
}

// MARK: - Plane

/// One plane of a planar image, addressed through its strides.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows. May exceed the width.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row. May exceed 1.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self { data, row_stride, pixel_stride }
    }

    /// Minimum number of bytes a plane of `width`×`height` samples occupies
    /// with these strides (the last row need not be padded).
    pub fn required_len(&self, width: u32, height: u32) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        (height as usize - 1) * self.row_stride + (width as usize - 1) * self.pixel_stride + 1
    }

    /// Sample at column `x`, row `y`. Callers check bounds via
    /// [`required_len`](Self::required_len) once per frame.
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }
}

// MARK: - RawFrame

/// A borrowed planar frame handed out by the capture session.
///
/// The lifetime ties it to the capture callback; nothing in the pipeline can
/// hold on to it once the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub luma: Plane<'a>,
    /// Sensor timestamp relative to session start.
    pub timestamp: Duration,
}

impl<'a> RawFrame<'a> {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

// MARK: - FrameBuffer

/// An owned packed RGBA frame. Storage is reused while the dimensions stay
/// the same and replaced when they change.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolution(resolution: Resolution) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_resolution(resolution);
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// True until storage has been sized for a frame.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Makes the storage fit `resolution`. Returns `true` when the previous
    /// region was released and a new one allocated.
    pub fn ensure_resolution(&mut self, resolution: Resolution) -> bool {
        let len = resolution.packed_len();
        if self.resolution() == resolution && self.pixels.len() == len {
            return false;
        }
        // Old region goes first so peak usage never holds both.
        self.release();
        self.pixels = vec![0; len];
        self.width = resolution.width;
        self.height = resolution.height;
        true
    }

    /// Drop the storage and forget the dimensions.
    pub fn release(&mut self) {
        self.pixels = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// RGBA value of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * PACKED_BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[offset..offset + PACKED_BYTES_PER_PIXEL]);
        px
    }

    /// Paint every pixel with one RGBA value.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(PACKED_BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    /// True when every pixel equals `rgba`.
    pub fn is_uniform(&self, rgba: [u8; 4]) -> bool {
        self.pixels
            .chunks_exact(PACKED_BYTES_PER_PIXEL)
            .all(|px| px == rgba)
    }
}
