//! edgecam-renderer: draws the newest published frame once per refresh.
//!
//! The [`Presenter`] owns the render-thread side of the pipeline: it polls
//! the [`ConsumerPort`](edgecam_pipeline::ConsumerPort) for session changes,
//! takes the newest frame from the handoff, uploads it to a texture, and
//! draws a full-viewport quad. Texture work goes through a [`RenderBackend`]:
//!
//! - [`SoftwareBackend`]: CPU rasterizer, used by the headless binary
//! - `EguiBackend` (edgecam-gui): egui texture + painter
//!
//! All backend calls happen on the render thread.

mod presenter;
mod quad;
mod software;

use edgecam_core::Resolution;
use thiserror::Error;

pub use presenter::{Presenter, PresenterStats, TickOutcome, UploadKind};
pub use quad::{QuadVertex, TexturedQuad};
pub use software::{SoftwareBackend, SoftwareTexture};

// MARK: - RenderBackend

/// Texture upload and draw calls, implemented per graphics API.
///
/// `pixels` is always packed RGBA of exactly `resolution.packed_len()` bytes.
pub trait RenderBackend {
    type Texture;

    /// Allocate a texture for `resolution` and fill it with `pixels`.
    fn create_texture(&mut self, resolution: Resolution, pixels: &[u8]) -> Result<Self::Texture, RendererError>;

    /// Reallocate `texture` at a new size and fill it (full re-specification).
    fn respecify_texture(
        &mut self,
        texture: &mut Self::Texture,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError>;

    /// Overwrite the full extent of `texture` in place; size is unchanged.
    fn update_texture(
        &mut self,
        texture: &mut Self::Texture,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError>;

    fn draw(&mut self, texture: &Self::Texture, quad: &TexturedQuad) -> Result<(), RendererError>;

    /// Fill the surface with black (nothing uploaded yet).
    fn clear(&mut self) -> Result<(), RendererError>;

    fn set_viewport(&mut self, viewport: Resolution);
}

// MARK: - GpuTexture

/// A backend texture plus the extents it was last specified with.
#[derive(Debug)]
pub struct GpuTexture<T> {
    pub allocated: Resolution,
    pub handle: T,
}

// MARK: - RendererError

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Texture upload failed: {0}")]
    UploadFailed(String),

    #[error("Failed to present frame: {0}")]
    PresentFailed(String),

    #[error("Render surface lost")]
    SurfaceLost,
}
