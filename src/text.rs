use std::collections::HashMap;

use ab_glyph::{Font, FontArc, ScaleFont, point};
use image::RgbaImage;
use kurbo::Point;

use crate::compose::over_straight;
use crate::error::{InkwaveError, InkwaveResult};

/// Fonts the compositor can resolve a text box's family against.
///
/// The editing surface captures family *names*; rasterization needs actual
/// font data, so callers register the faces they ship. The first registered
/// face doubles as the fallback for unknown families.
#[derive(Clone, Default)]
pub struct FontStore {
    faces: HashMap<String, FontArc>,
    fallback: Option<FontArc>,
}

impl FontStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, family: impl Into<String>, font: FontArc) {
        if self.fallback.is_none() {
            self.fallback = Some(font.clone());
        }
        self.faces.insert(family.into(), font);
    }

    pub fn register_bytes(
        &mut self,
        family: impl Into<String>,
        bytes: Vec<u8>,
    ) -> InkwaveResult<()> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| InkwaveError::validation(format!("invalid font data: {e}")))?;
        self.register(family, font);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.fallback.is_none()
    }

    /// Exact family match, else the fallback face.
    pub fn resolve(&self, family: &str) -> InkwaveResult<&FontArc> {
        self.faces
            .get(family)
            .or(self.fallback.as_ref())
            .ok_or_else(|| InkwaveError::compose("font store has no registered faces"))
    }
}

/// Lay out one line with kerning, returning `(glyph_id, x_offset)` pairs and
/// the total advance width.
fn layout_line(font: &FontArc, text: &str, size_px: f32) -> (Vec<(ab_glyph::GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(size_px);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor = 0.0f32;
    let mut prev: Option<ab_glyph::GlyphId> = None;

    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        glyphs.push((id, cursor));
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }
    (glyphs, cursor)
}

/// Rasterize `text` onto `img` with the top of the em box at `top_left`
/// (the baseline sits one ascent below). Lines split on `\n`. Coverage is
/// blended over the destination in straight alpha.
pub fn draw_text(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    size_px: f32,
    top_left: Point,
    color: [u8; 4],
) {
    let scaled = font.as_scaled(size_px);
    let ascent = scaled.ascent();
    let line_height = scaled.height();
    let (w, h) = img.dimensions();

    for (line_idx, line) in text.split('\n').enumerate() {
        let baseline_y = top_left.y as f32 + ascent + line_idx as f32 * line_height;
        let (glyphs, _) = layout_line(font, line, size_px);

        for (id, x_off) in glyphs {
            let glyph = id.with_scale_and_position(
                size_px,
                point(top_left.x as f32 + x_off, baseline_y),
            );
            let Some(outline) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outline.px_bounds();
            outline.draw(|gx, gy, coverage| {
                let px = bounds.min.x + gx as f32;
                let py = bounds.min.y + gy as f32;
                if px < 0.0 || py < 0.0 {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                if px >= w || py >= h {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * color[3] as f32).round() as u8;
                if alpha == 0 {
                    return;
                }
                let src = [color[0], color[1], color[2], alpha];
                let dst = img.get_pixel_mut(px, py);
                dst.0 = over_straight(dst.0, src);
            });
        }
    }
}
