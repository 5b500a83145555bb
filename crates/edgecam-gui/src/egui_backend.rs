use edgecam_core::Resolution;
use edgecam_renderer::{RenderBackend, RendererError, TexturedQuad};
use egui::{Color32, ColorImage, Painter, Rect, TextureHandle, TextureOptions};

const TEXTURE_NAME: &str = "edgecam-frame";

/// [`RenderBackend`] over egui: textures are egui managed textures, and the
/// quad is painted into the rect of the current frame's painter.
pub struct EguiBackend {
    ctx: egui::Context,
    painter: Option<Painter>,
    rect: Rect,
    options: TextureOptions,
}

impl EguiBackend {
    pub fn new(ctx: egui::Context) -> Self {
        Self { ctx, painter: None, rect: Rect::NOTHING, options: TextureOptions::LINEAR }
    }

    /// Paint into `painter` (clipped to `rect`) for the coming tick.
    pub fn begin_frame(&mut self, painter: Painter, rect: Rect) {
        self.painter = Some(painter);
        self.rect = rect;
    }

    fn painter(&self) -> Result<&Painter, RendererError> {
        self.painter.as_ref().ok_or(RendererError::SurfaceLost)
    }
}

fn color_image(resolution: Resolution, pixels: &[u8]) -> Result<ColorImage, RendererError> {
    if pixels.len() != resolution.packed_len() {
        return Err(RendererError::UploadFailed(format!(
            "{} bytes for a {} texture (expected {})",
            pixels.len(),
            resolution,
            resolution.packed_len()
        )));
    }
    let size = [resolution.width as usize, resolution.height as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, pixels))
}

impl RenderBackend for EguiBackend {
    type Texture = TextureHandle;

    fn create_texture(&mut self, resolution: Resolution, pixels: &[u8]) -> Result<TextureHandle, RendererError> {
        let image = color_image(resolution, pixels)?;
        Ok(self.ctx.load_texture(TEXTURE_NAME, image, self.options))
    }

    fn respecify_texture(
        &mut self,
        texture: &mut TextureHandle,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError> {
        texture.set(color_image(resolution, pixels)?, self.options);
        Ok(())
    }

    fn update_texture(
        &mut self,
        texture: &mut TextureHandle,
        resolution: Resolution,
        pixels: &[u8],
    ) -> Result<(), RendererError> {
        let [w, h] = texture.size();
        if [w as u32, h as u32] != [resolution.width, resolution.height] {
            return Err(RendererError::UploadFailed(format!(
                "partial update of {} into a {}×{} texture",
                resolution, w, h
            )));
        }
        texture.set_partial([0, 0], color_image(resolution, pixels)?, self.options);
        Ok(())
    }

    fn draw(&mut self, texture: &TextureHandle, quad: &TexturedQuad) -> Result<(), RendererError> {
        let [u0, v0] = quad.top_left_uv();
        let [u1, v1] = quad.bottom_right_uv();
        let uv = Rect::from_min_max(egui::pos2(u0, v0), egui::pos2(u1, v1));
        self.painter()?.image(texture.id(), self.rect, uv, Color32::WHITE);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RendererError> {
        self.painter()?.rect_filled(self.rect, 0.0, Color32::BLACK);
        Ok(())
    }

    fn set_viewport(&mut self, _viewport: Resolution) {
        // The paint rect arrives with each `begin_frame`.
    }
}
