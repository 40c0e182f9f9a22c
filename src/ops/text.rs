use ab_glyph::{point, Font, FontArc, GlyphId, OutlinedGlyph, ScaleFont};

use crate::canvas::Dimensions;
use crate::ops::shapes::Coverage;

/// Lay out one line of text starting at x = 0, returning each glyph with
/// its pen x-offset and the total advance width.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Rasterize `text` into a coverage mask in physical space.
///
/// `origin` is the logical position of the first line's baseline start,
/// and `font_size` is a logical pixel size. Lines are separated by `'\n'`.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: (f32, f32),
    dims: &Dimensions,
) -> Coverage {
    if dims.is_empty() || text.trim().is_empty() {
        return Coverage::default();
    }

    let size = dims.scale_length(font_size);
    let (ox, oy) = dims.to_physical(origin.0, origin.1);
    let line_height = font.as_scaled(size).height();

    let mut outlined: Vec<OutlinedGlyph> = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        let baseline = oy + line_idx as f32 * line_height;
        let (glyphs, _) = layout_line(font, line, size);
        for (id, gx) in glyphs {
            let glyph = id.with_scale_and_position(size, point(ox + gx, baseline));
            if let Some(o) = font.outline_glyph(glyph) {
                outlined.push(o);
            }
        }
    }
    if outlined.is_empty() {
        return Coverage::default();
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for o in &outlined {
        let b = o.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let x0 = (min_x.floor() as i64).max(0);
    let y0 = (min_y.floor() as i64).max(0);
    let x1 = (max_x.ceil() as i64).min(dims.physical_width as i64);
    let y1 = (max_y.ceil() as i64).min(dims.physical_height as i64);
    if x1 <= x0 || y1 <= y0 {
        return Coverage::default();
    }
    let width = (x1 - x0) as u32;
    let height = (y1 - y0) as u32;
    let mut values = vec![0.0f32; width as usize * height as usize];

    for o in &outlined {
        let b = o.px_bounds();
        let (bx, by) = (b.min.x as i64, b.min.y as i64);
        o.draw(|gx, gy, cov| {
            let x = bx + gx as i64 - x0;
            let y = by + gy as i64 - y0;
            if x >= 0 && y >= 0 && x < width as i64 && y < height as i64 {
                let idx = y as usize * width as usize + x as usize;
                values[idx] = values[idx].max(cov);
            }
        });
    }

    Coverage { x0: x0 as u32, y0: y0 as u32, width, height, values }
}

/// Load a font by family name from the system. Returns `None` when the
/// family (or any usable fallback) cannot be found.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let families = [FamilyName::Title(family.to_string()), FamilyName::SansSerif];
    let handle = source
        .select_best_match(&families, &Properties::new())
        .ok()?;

    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_rasterizes_to_nothing() {
        let Some(font) = load_system_font("sans-serif") else { return };
        let cov = rasterize_text(&font, "   ", 24.0, (10.0, 40.0), &Dimensions::new(200, 100, 1.0));
        assert!(cov.is_empty());
    }

    #[test]
    fn placeholder_text_lands_above_its_baseline() {
        let Some(font) = load_system_font("sans-serif") else { return };
        let dims = Dimensions::new(300, 120, 1.0);
        let cov = rasterize_text(&font, "Texto", 27.0, (30.0, 60.0), &dims);
        assert!(!cov.is_empty());
        assert!(cov.x0 >= 29);
        assert!(cov.y0 < 60);
        assert!(cov.values.iter().any(|&v| v > 0.5));
    }

    #[test]
    fn layout_advances_monotonically() {
        let Some(font) = load_system_font("sans-serif") else { return };
        let (glyphs, width) = layout_line(&font, "abc", 20.0);
        assert_eq!(glyphs.len(), 3);
        assert!(glyphs[0].1 < glyphs[1].1 && glyphs[1].1 < glyphs[2].1);
        assert!(width > glyphs[2].1);
    }
}
