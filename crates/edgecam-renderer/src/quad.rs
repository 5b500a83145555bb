/// One vertex of the full-viewport quad: clip-space position and texture
/// coordinate (v = 0 is the first image row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Four vertices drawn as a triangle strip covering the whole viewport.
/// The image is stretched to fill; aspect ratio is not preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedQuad {
    pub vertices: [QuadVertex; 4],
}

impl TexturedQuad {
    /// Strip order: bottom-left, bottom-right, top-left, top-right.
    pub fn full_viewport(flip_vertical: bool) -> Self {
        let (top, bottom) = if flip_vertical { (1.0, 0.0) } else { (0.0, 1.0) };
        Self {
            vertices: [
                QuadVertex { position: [-1.0, -1.0], uv: [0.0, bottom] },
                QuadVertex { position: [1.0, -1.0], uv: [1.0, bottom] },
                QuadVertex { position: [-1.0, 1.0], uv: [0.0, top] },
                QuadVertex { position: [1.0, 1.0], uv: [1.0, top] },
            ],
        }
    }

    /// Texture coordinate at the top-left corner of the screen.
    pub fn top_left_uv(&self) -> [f32; 2] {
        self.vertices[2].uv
    }

    /// Texture coordinate at the bottom-right corner of the screen.
    pub fn bottom_right_uv(&self) -> [f32; 2] {
        self.vertices[1].uv
    }

    pub fn is_flipped(&self) -> bool {
        self.top_left_uv()[1] > self.bottom_right_uv()[1]
    }

    /// Texture coordinate for a point given as fractions of the viewport
    /// (`fx`, `fy` in 0..=1, origin top-left).
    pub fn uv_at(&self, fx: f32, fy: f32) -> [f32; 2] {
        let [u0, v0] = self.top_left_uv();
        let [u1, v1] = self.bottom_right_uv();
        [u0 + (u1 - u0) * fx, v0 + (v1 - v0) * fy]
    }
}

impl Default for TexturedQuad {
    fn default() -> Self {
        Self::full_viewport(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_covers_clip_space() {
        let quad = TexturedQuad::default();
        let positions: Vec<_> = quad.vertices.iter().map(|v| v.position).collect();
        assert_eq!(positions, vec![[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]);
        assert_eq!(quad.top_left_uv(), [0.0, 0.0]);
        assert_eq!(quad.bottom_right_uv(), [1.0, 1.0]);
        assert!(!quad.is_flipped());
    }

    #[test]
    fn vertical_flip_swaps_v_only() {
        let quad = TexturedQuad::full_viewport(true);
        assert_eq!(quad.top_left_uv(), [0.0, 1.0]);
        assert_eq!(quad.bottom_right_uv(), [1.0, 0.0]);
        assert!(quad.is_flipped());
        assert_eq!(quad.uv_at(0.25, 0.25), [0.25, 0.75]);
    }
}
