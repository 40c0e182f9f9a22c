use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::ops::shapes::Coverage;

/// Coverage below this is treated as "not touched".
const COVERAGE_EPSILON: f32 = 0.001;

// ============================================================================
// DIMENSIONS: logical (input) vs physical (backing buffer) size
// ============================================================================

/// Clamp a device pixel ratio to something usable. Non-finite or
/// non-positive ratios fall back to 1.0.
pub fn sanitize_dpr(dpr: f32) -> f32 {
    if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 }
}

/// Paired surface sizes. All pointer and shape coordinates are logical;
/// the backing buffer is physical. `physical = round(logical * dpr)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dimensions {
    pub logical_width: u32,
    pub logical_height: u32,
    pub physical_width: u32,
    pub physical_height: u32,
    pub device_pixel_ratio: f32,
}

impl Dimensions {
    pub fn new(logical_width: u32, logical_height: u32, device_pixel_ratio: f32) -> Self {
        let dpr = sanitize_dpr(device_pixel_ratio);
        Self {
            logical_width,
            logical_height,
            physical_width: (logical_width as f32 * dpr).round() as u32,
            physical_height: (logical_height as f32 * dpr).round() as u32,
            device_pixel_ratio: dpr,
        }
    }

    /// Map a logical point into backing-buffer space.
    #[inline]
    pub fn to_physical(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.device_pixel_ratio, y * self.device_pixel_ratio)
    }

    /// Scale a logical length (stroke width, font size) to physical pixels.
    #[inline]
    pub fn scale_length(&self, len: f32) -> f32 {
        len * self.device_pixel_ratio
    }

    pub fn is_empty(&self) -> bool {
        self.physical_width == 0 || self.physical_height == 0
    }
}

// ============================================================================
// SURFACE: the pixel buffer one editing session draws into
// ============================================================================

/// The backing buffer of an annotation session. Created when an image
/// finishes loading and dropped with the session; never shared.
#[derive(Clone)]
pub struct Surface {
    dims: Dimensions,
    pixels: RgbaImage,
}

impl Surface {
    /// Fully transparent surface of the given size.
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            pixels: RgbaImage::new(dims.physical_width, dims.physical_height),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Clear to transparent black.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Clear, then draw `src` at (0, 0) stretched over the logical area,
    /// i.e. over the whole physical buffer.
    pub fn draw_image(&mut self, src: &RgbaImage) {
        self.clear();
        let (w, h) = (self.dims.physical_width, self.dims.physical_height);
        if w == 0 || h == 0 {
            return;
        }
        if src.dimensions() == (w, h) {
            self.pixels.copy_from_slice(src.as_raw());
        } else {
            self.pixels = image::imageops::resize(src, w, h, FilterType::Triangle);
        }
    }

    /// Overwrite the buffer with a snapshot of identical size.
    /// Snapshots of another size are ignored.
    pub fn restore(&mut self, snapshot: &RgbaImage) {
        if snapshot.dimensions() != self.pixels.dimensions() {
            crate::log_warn!(
                "Surface::restore: snapshot {:?} does not match buffer {:?}",
                snapshot.dimensions(),
                self.pixels.dimensions()
            );
            return;
        }
        self.pixels.copy_from_slice(snapshot.as_raw());
    }

    /// Paint `color` through a coverage mask using source-over compositing.
    pub fn composite(&mut self, coverage: &Coverage, color: Rgba<u8>) {
        self.for_each_covered(coverage, |dst, _, _, cov| {
            let top_a = color[3] as f32 / 255.0 * cov;
            *dst = source_over(*dst, color, top_a);
        });
    }

    /// Blend covered pixels back toward `reference` (same size as the
    /// buffer). This is how annotations are erased without touching the
    /// image underneath them.
    pub fn restore_toward(&mut self, reference: &RgbaImage, coverage: &Coverage) {
        if reference.dimensions() != self.pixels.dimensions() {
            return;
        }
        self.for_each_covered(coverage, |dst, x, y, cov| {
            let src = *reference.get_pixel(x, y);
            *dst = lerp_pixel(*dst, src, cov);
        });
    }

    /// Run `f` on every pixel with non-zero coverage, row-parallel.
    fn for_each_covered<F>(&mut self, coverage: &Coverage, f: F)
    where
        F: Fn(&mut Rgba<u8>, u32, u32, f32) + Sync,
    {
        if coverage.is_empty() {
            return;
        }
        let buf_w = self.pixels.width();
        let row_bytes = buf_w as usize * 4;
        let (x0, y0) = (coverage.x0, coverage.y0);
        let (cw, ch) = (coverage.width, coverage.height);

        self.pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .skip(y0 as usize)
            .take(ch as usize)
            .for_each(|(y, row)| {
                let cov_row = &coverage.values[(y - y0 as usize) * cw as usize..][..cw as usize];
                for (i, &cov) in cov_row.iter().enumerate() {
                    if cov <= COVERAGE_EPSILON {
                        continue;
                    }
                    let x = x0 + i as u32;
                    let idx = x as usize * 4;
                    let mut px = Rgba([row[idx], row[idx + 1], row[idx + 2], row[idx + 3]]);
                    f(&mut px, x, y as u32, cov.min(1.0));
                    row[idx..idx + 4].copy_from_slice(&px.0);
                }
            });
    }
}

/// Straight-alpha source-over of `top` (with effective alpha `top_a`) onto `base`.
#[inline]
pub fn source_over(base: Rgba<u8>, top: Rgba<u8>, top_a: f32) -> Rgba<u8> {
    if top_a <= 0.0 {
        return base;
    }
    if top_a >= 1.0 {
        return Rgba([top[0], top[1], top[2], 255]);
    }
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |t: u8, b: u8| -> u8 {
        let v = (t as f32 * top_a + b as f32 * base_a * (1.0 - top_a)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[inline]
fn lerp_pixel(from: Rgba<u8>, to: Rgba<u8>, t: f32) -> Rgba<u8> {
    if t >= 1.0 {
        return to;
    }
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8;
    Rgba([
        mix(from[0], to[0]),
        mix(from[1], to[1]),
        mix(from[2], to[2]),
        mix(from[3], to[3]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_coverage(x0: u32, y0: u32, w: u32, h: u32) -> Coverage {
        Coverage { x0, y0, width: w, height: h, values: vec![1.0; (w * h) as usize] }
    }

    #[test]
    fn physical_size_follows_dpr() {
        let dims = Dimensions::new(800, 400, 2.0);
        assert_eq!((dims.physical_width, dims.physical_height), (1600, 800));
        assert_eq!(dims.to_physical(10.0, 5.5), (20.0, 11.0));
    }

    #[test]
    fn bad_dpr_falls_back_to_one() {
        assert_eq!(sanitize_dpr(0.0), 1.0);
        assert_eq!(sanitize_dpr(-2.0), 1.0);
        assert_eq!(sanitize_dpr(f32::NAN), 1.0);
        assert_eq!(sanitize_dpr(1.5), 1.5);
    }

    #[test]
    fn draw_image_same_size_is_exact_copy() {
        let src = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 7, 255]));
        let mut surface = Surface::new(Dimensions::new(4, 3, 1.0));
        surface.draw_image(&src);
        assert_eq!(surface.pixels().as_raw(), src.as_raw());
    }

    #[test]
    fn draw_image_resamples_to_physical_size() {
        let src = RgbaImage::from_pixel(10, 10, Rgba([50, 60, 70, 255]));
        let mut surface = Surface::new(Dimensions::new(5, 5, 2.0));
        surface.draw_image(&src);
        assert_eq!(surface.pixels().dimensions(), (10, 10));
        let mut surface = Surface::new(Dimensions::new(4, 4, 1.0));
        surface.draw_image(&src);
        assert_eq!(surface.pixels().dimensions(), (4, 4));
        assert_eq!(*surface.pixels().get_pixel(2, 2), Rgba([50, 60, 70, 255]));
    }

    #[test]
    fn opaque_composite_overwrites_covered_pixels_only() {
        let mut surface = Surface::new(Dimensions::new(4, 4, 1.0));
        surface.draw_image(&RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        surface.composite(&full_coverage(1, 1, 2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.pixels().get_pixel(1, 1), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.pixels().get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*surface.pixels().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*surface.pixels().get_pixel(3, 3), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn restore_toward_reference_undoes_paint() {
        let base = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let mut surface = Surface::new(Dimensions::new(3, 3, 1.0));
        surface.draw_image(&base);
        surface.composite(&full_coverage(0, 0, 3, 3), Rgba([0, 255, 0, 255]));
        surface.restore_toward(&base, &full_coverage(0, 0, 3, 3));
        assert_eq!(surface.pixels().as_raw(), base.as_raw());
    }

    #[test]
    fn restore_ignores_mismatched_snapshots() {
        let mut surface = Surface::new(Dimensions::new(2, 2, 1.0));
        surface.restore(&RgbaImage::from_pixel(3, 3, Rgba([1, 1, 1, 1])));
        assert!(surface.pixels().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn half_alpha_over_transparent_keeps_color() {
        let out = source_over(Rgba([0, 0, 0, 0]), Rgba([200, 100, 50, 255]), 0.5);
        assert_eq!(out, Rgba([200, 100, 50, 128]));
    }
}
