use edgecam_core::{Resolution, PACKED_BYTES_PER_PIXEL};
use tracing::debug;

use crate::{RenderBackend, RendererError, TexturedQuad};

/// CPU-side texture: a private copy of the uploaded pixels.
#[derive(Debug, Clone)]
pub struct SoftwareTexture {
    resolution: Resolution,
    pixels: Vec<u8>,
}

impl SoftwareTexture {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Rasterizes the quad into an RGBA surface with nearest sampling.
#[derive(Debug)]
pub struct SoftwareBackend {
    viewport: Resolution,
    surface: Vec<u8>,
    draws: u64,
}

impl SoftwareBackend {
    pub fn new(viewport: Resolution) -> Self {
        Self { viewport, surface: vec![0; viewport.packed_len()], draws: 0 }
    }

    pub fn viewport(&self) -> Resolution {
        self.viewport
    }

    /// The last rendered image, packed RGBA at viewport size.
    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    pub fn surface_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.viewport.width as usize + x as usize) * PACKED_BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.surface[offset..offset + PACKED_BYTES_PER_PIXEL]);
        px
    }

    /// Draw calls completed so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

fn check_len(resolution: Resolution, pixels: &[u8]) -> Result<(), RendererError> {
    if pixels.len() != resolution.packed_len() {
        return Err(RendererError::UploadFailed(format!(
            "{} bytes for a {} texture (expected {})",
            pixels.len(),
            resolution,
            resolution.packed_len()
        )));
    }
    Ok(())
}

impl RenderBackend for SoftwareBackend {
    type Texture = SoftwareTexture;

    fn create_texture(&mut self, resolution: Resolution, pixels: &[u8]) -> Result<SoftwareTexture, RendererError> {
        check_len(resolution, pixels)?;
        debug!("Software texture created at {}", resolution);
        Ok(SoftwareTexture { resolution, pixels: pixels.to_vec() })
    }

    fn respecify_texture(
        &mut self,
        texture: &mut SoftwareTexture,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError> {
        check_len(resolution, pixels)?;
        texture.pixels = pixels.to_vec();
        texture.resolution = resolution;
        Ok(())
    }

    fn update_texture(
        &mut self,
        texture: &mut SoftwareTexture,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError> {
        if texture.resolution != resolution {
            return Err(RendererError::UploadFailed(format!(
                "partial update of {} into a {} texture",
                resolution, texture.resolution
            )));
        }
        check_len(resolution, pixels)?;
        texture.pixels.copy_from_slice(pixels);
        Ok(())
    }

    fn draw(&mut self, texture: &SoftwareTexture, quad: &TexturedQuad) -> Result<(), RendererError> {
        let (vw, vh) = (self.viewport.width as usize, self.viewport.height as usize);
        let (tw, th) = (texture.resolution.width as usize, texture.resolution.height as usize);
        if tw == 0 || th == 0 {
            return Err(RendererError::PresentFailed("empty texture".into()));
        }

        for y in 0..vh {
            let fy = (y as f32 + 0.5) / vh as f32;
            for x in 0..vw {
                let [u, v] = quad.uv_at((x as f32 + 0.5) / vw as f32, fy);
                let tx = ((u * tw as f32) as usize).min(tw - 1);
                let ty = ((v * th as f32) as usize).min(th - 1);
                let src = (ty * tw + tx) * PACKED_BYTES_PER_PIXEL;
                let dst = (y * vw + x) * PACKED_BYTES_PER_PIXEL;
                self.surface[dst..dst + PACKED_BYTES_PER_PIXEL]
                    .copy_from_slice(&texture.pixels[src..src + PACKED_BYTES_PER_PIXEL]);
            }
        }
        self.draws += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RendererError> {
        for px in self.surface.chunks_exact_mut(PACKED_BYTES_PER_PIXEL) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Resolution) {
        self.viewport = viewport;
        self.surface = vec![0; viewport.packed_len()];
    }
}
