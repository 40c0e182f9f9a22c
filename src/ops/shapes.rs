use rayon::prelude::*;

use crate::canvas::Dimensions;

/// Extra pixels around every mark's bounding box for the anti-aliased edge.
const AA_PAD: f32 = 2.0;

/// Minimum arrow head length in logical pixels.
const MIN_ARROW_HEAD: f32 = 10.0;

// ============================================================================
// MARKS: completed pointer interactions, in logical coordinates
// ============================================================================

/// A stroke or shape ready to be rasterized. Points are logical pixels;
/// `width` is the logical stroke width.
#[derive(Clone, Debug, PartialEq)]
pub enum Mark {
    /// Brush or eraser path. A single point paints a dot.
    Freehand { points: Vec<(f32, f32)>, width: f32 },
    /// Outline of the box spanned by a drag.
    Rectangle { from: (f32, f32), to: (f32, f32), width: f32 },
    /// Outline of the ellipse inscribed in the box spanned by a drag.
    Ellipse { from: (f32, f32), to: (f32, f32), width: f32 },
    /// Shaft from `from` to `to` with a filled head at `to`.
    Arrow { from: (f32, f32), to: (f32, f32), width: f32 },
}

/// A per-pixel coverage mask (0.0..=1.0) over a rectangle of the physical
/// buffer. Always clipped to the buffer it was rasterized for.
#[derive(Clone, Debug, Default)]
pub struct Coverage {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl Coverage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return 0.0;
        }
        self.values[((y - self.y0) * self.width + (x - self.x0)) as usize]
    }
}

// ============================================================================
// SDF functions: return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

/// Distance to a line segment. Degenerate segments measure to the point.
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < 1e-12 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Signed distance to a convex polygon (either winding).
fn sdf_convex_polygon(verts: &[(f32, f32)], px: f32, py: f32) -> f32 {
    let n = verts.len();
    let mut d = (px - verts[0].0) * (px - verts[0].0) + (py - verts[0].1) * (py - verts[0].1);
    let mut s: f32 = 1.0;
    let mut j = n - 1;
    for i in 0..n {
        let ex = verts[j].0 - verts[i].0;
        let ey = verts[j].1 - verts[i].1;
        let wx = px - verts[i].0;
        let wy = py - verts[i].1;
        let e_len = ex * ex + ey * ey;
        let t = if e_len < 1e-12 { 0.0 } else { ((wx * ex + wy * ey) / e_len).clamp(0.0, 1.0) };
        let bx = wx - ex * t;
        let by = wy - ey * t;
        d = d.min(bx * bx + by * by);
        let c1 = py >= verts[i].1;
        let c2 = py < verts[j].1;
        let c3 = ex * wy > ey * wx;
        if (c1 && c2 && c3) || (!c1 && !c2 && !c3) {
            s = -s;
        }
        j = i;
    }
    s * d.sqrt()
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// FREEHAND: capsules painted segment by segment
// ============================================================================

/// One brush segment in physical space with its padded pixel bounds.
#[derive(Clone, Copy, Debug)]
struct Capsule {
    a: (f32, f32),
    b: (f32, f32),
    radius: f32,
    min: (f32, f32),
    max: (f32, f32),
}

impl Capsule {
    fn new(a: (f32, f32), b: (f32, f32), radius: f32) -> Self {
        let r = radius + AA_PAD;
        Self {
            a,
            b,
            radius,
            min: (a.0.min(b.0) - r, a.1.min(b.1) - r),
            max: (a.0.max(b.0) + r, a.1.max(b.1) + r),
        }
    }

    #[inline]
    fn coverage_at(&self, px: f32, py: f32) -> f32 {
        let d = sdf_line_segment(px, py, self.a.0, self.a.1, self.b.0, self.b.1) - self.radius;
        smoothstep(0.5, -0.5, d)
    }
}

/// Consecutive point pairs as capsules; a lone point is a zero-length one.
fn capsules(points: &[(f32, f32)], radius: f32) -> Vec<Capsule> {
    match points {
        [] => Vec::new(),
        [only] => vec![Capsule::new(*only, *only, radius)],
        pts => pts.windows(2).map(|w| Capsule::new(w[0], w[1], radius)).collect(),
    }
}

/// Max-merge capsules into `mask`. Each capsule only touches the pixels
/// inside its own bounds, so cost follows the painted area, not the mask.
fn paint_capsules(mask: &mut Coverage, caps: &[Capsule]) {
    if mask.is_empty() || caps.is_empty() {
        return;
    }
    let w = mask.width as usize;
    let (fx0, fy0) = (mask.x0 as f32, mask.y0 as f32);
    let top = caps.iter().map(|c| c.min.1).fold(f32::MAX, f32::min);
    let bottom = caps.iter().map(|c| c.max.1).fold(f32::MIN, f32::max);
    let row_start = ((top - fy0).floor().max(0.0) as usize).min(mask.height as usize);
    let row_end = ((bottom - fy0).ceil().max(0.0) as usize).min(mask.height as usize);
    if row_end <= row_start {
        return;
    }

    mask.values[row_start * w..row_end * w]
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(i, out)| {
            let py = fy0 + (row_start + i) as f32 + 0.5;
            for c in caps {
                if py < c.min.1 || py > c.max.1 {
                    continue;
                }
                let from = (c.min.0 - fx0).floor().max(0.0) as usize;
                let to = ((c.max.0 - fx0).ceil().max(0.0) as usize).min(w);
                for (col, v) in out.iter_mut().enumerate().take(to).skip(from) {
                    let cov = c.coverage_at(fx0 + col as f32 + 0.5, py);
                    if cov > *v {
                        *v = cov;
                    }
                }
            }
        });
}

/// Paint one brush segment (logical coordinates) into an existing mask.
/// A stroke in progress grows its mask this way, one pointer move at a time.
pub fn paint_segment(mask: &mut Coverage, from: (f32, f32), to: (f32, f32), width: f32, dims: &Dimensions) {
    let cap = Capsule::new(
        dims.to_physical(from.0, from.1),
        dims.to_physical(to.0, to.1),
        dims.scale_length(width) * 0.5,
    );
    paint_capsules(mask, &[cap]);
}

// ============================================================================
// PHYSICAL-SPACE GEOMETRY
// ============================================================================

/// A closed shape converted to backing-buffer space, ready for per-pixel
/// queries.
enum Geometry {
    Box { cx: f32, cy: f32, hx: f32, hy: f32, half_w: f32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32, half_w: f32 },
    Arrow { shaft: [(f32, f32); 2], radius: f32, head: [(f32, f32); 3] },
}

impl Geometry {
    /// `None` for freehand marks, which are painted as capsules.
    fn from_mark(mark: &Mark, dims: &Dimensions) -> Option<Self> {
        let p = |(x, y): (f32, f32)| dims.to_physical(x, y);
        let geometry = match mark {
            Mark::Freehand { .. } => return None,
            Mark::Rectangle { from, to, width } => {
                let (a, b) = (p(*from), p(*to));
                Geometry::Box {
                    cx: (a.0 + b.0) * 0.5,
                    cy: (a.1 + b.1) * 0.5,
                    hx: (b.0 - a.0).abs() * 0.5,
                    hy: (b.1 - a.1).abs() * 0.5,
                    half_w: dims.scale_length(*width) * 0.5,
                }
            }
            Mark::Ellipse { from, to, width } => {
                let (a, b) = (p(*from), p(*to));
                Geometry::Ellipse {
                    cx: (a.0 + b.0) * 0.5,
                    cy: (a.1 + b.1) * 0.5,
                    rx: (b.0 - a.0).abs() * 0.5,
                    ry: (b.1 - a.1).abs() * 0.5,
                    half_w: dims.scale_length(*width) * 0.5,
                }
            }
            Mark::Arrow { from, to, width } => {
                let (a, b) = (p(*from), p(*to));
                let radius = dims.scale_length(*width) * 0.5;
                let dx = b.0 - a.0;
                let dy = b.1 - a.1;
                let len = (dx * dx + dy * dy).sqrt();
                let head_len = dims
                    .scale_length(MIN_ARROW_HEAD.max(width * 3.0))
                    .min(len);
                let head_half = head_len * 0.6;
                let (ux, uy) = if len > 1e-6 { (dx / len, dy / len) } else { (1.0, 0.0) };
                let base = (b.0 - ux * head_len, b.1 - uy * head_len);
                Geometry::Arrow {
                    shaft: [a, base],
                    radius,
                    head: [
                        b,
                        (base.0 - uy * head_half, base.1 + ux * head_half),
                        (base.0 + uy * head_half, base.1 - ux * head_half),
                    ],
                }
            }
        };
        Some(geometry)
    }

    /// Bounding box (min_x, min_y, max_x, max_y) before padding.
    fn bounds(&self) -> (f32, f32, f32, f32) {
        let mut b = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        let mut grow = |x: f32, y: f32, r: f32| {
            b.0 = b.0.min(x - r);
            b.1 = b.1.min(y - r);
            b.2 = b.2.max(x + r);
            b.3 = b.3.max(y + r);
        };
        match self {
            Geometry::Box { cx, cy, hx, hy, half_w }
            | Geometry::Ellipse { cx, cy, rx: hx, ry: hy, half_w } => {
                grow(cx - hx, cy - hy, *half_w);
                grow(cx + hx, cy + hy, *half_w);
            }
            Geometry::Arrow { shaft, radius, head } => {
                for &(x, y) in shaft {
                    grow(x, y, *radius);
                }
                for &(x, y) in head {
                    grow(x, y, 0.0);
                }
            }
        }
        b
    }

    /// Signed distance from a physical pixel centre to the painted region.
    fn distance(&self, px: f32, py: f32) -> f32 {
        match self {
            Geometry::Box { cx, cy, hx, hy, half_w } => {
                sdf_box(px - cx, py - cy, *hx, *hy).abs() - half_w
            }
            Geometry::Ellipse { cx, cy, rx, ry, half_w } => {
                let (lx, ly) = (px - cx, py - cy);
                let d = if *rx < 1e-3 || *ry < 1e-3 {
                    // Collapsed drag: the ellipse degenerates to its diameter.
                    sdf_line_segment(lx, ly, -rx, -ry, *rx, *ry)
                } else {
                    sdf_ellipse(lx, ly, *rx, *ry).abs()
                };
                d - half_w
            }
            Geometry::Arrow { shaft, radius, head } => {
                let shaft_d =
                    sdf_line_segment(px, py, shaft[0].0, shaft[0].1, shaft[1].0, shaft[1].1) - radius;
                let head_d = sdf_convex_polygon(head, px, py);
                shaft_d.min(head_d)
            }
        }
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Zero mask over `min..max` (physical, already padded), clipped to the buffer.
fn blank_mask(min: (f32, f32), max: (f32, f32), dims: &Dimensions) -> Coverage {
    let x0 = (min.0.floor() as i64).max(0);
    let y0 = (min.1.floor() as i64).max(0);
    let x1 = (max.0.ceil() as i64).min(dims.physical_width as i64);
    let y1 = (max.1.ceil() as i64).min(dims.physical_height as i64);
    if x1 <= x0 || y1 <= y0 {
        return Coverage::default();
    }
    let width = (x1 - x0) as u32;
    let height = (y1 - y0) as u32;
    Coverage {
        x0: x0 as u32,
        y0: y0 as u32,
        width,
        height,
        values: vec![0.0; width as usize * height as usize],
    }
}

impl Coverage {
    /// Zero mask over the whole physical buffer.
    pub fn blank(dims: &Dimensions) -> Self {
        blank_mask((0.0, 0.0), (dims.physical_width as f32, dims.physical_height as f32), dims)
    }
}

/// Rasterize a mark into an anti-aliased coverage mask in physical space,
/// clipped to the buffer described by `dims`.
pub fn rasterize_mark(mark: &Mark, dims: &Dimensions) -> Coverage {
    if dims.is_empty() {
        return Coverage::default();
    }

    let Some(geometry) = Geometry::from_mark(mark, dims) else {
        let Mark::Freehand { points, width } = mark else { return Coverage::default() };
        let physical: Vec<(f32, f32)> = points.iter().map(|&(x, y)| dims.to_physical(x, y)).collect();
        let caps = capsules(&physical, dims.scale_length(*width) * 0.5);
        if caps.is_empty() {
            return Coverage::default();
        }
        let min = caps.iter().fold((f32::MAX, f32::MAX), |m, c| (m.0.min(c.min.0), m.1.min(c.min.1)));
        let max = caps.iter().fold((f32::MIN, f32::MIN), |m, c| (m.0.max(c.max.0), m.1.max(c.max.1)));
        let mut mask = blank_mask(min, max, dims);
        paint_capsules(&mut mask, &caps);
        return mask;
    };

    let (min_x, min_y, max_x, max_y) = geometry.bounds();
    let mut mask = blank_mask((min_x - AA_PAD, min_y - AA_PAD), (max_x + AA_PAD, max_y + AA_PAD), dims);
    if mask.is_empty() {
        return mask;
    }
    let (x0, y0) = (mask.x0, mask.y0);
    mask.values
        .par_chunks_mut(mask.width as usize)
        .enumerate()
        .for_each(|(row, out)| {
            let py = (y0 as usize + row) as f32 + 0.5;
            for (col, v) in out.iter_mut().enumerate() {
                let px = (x0 as usize + col) as f32 + 0.5;
                *v = smoothstep(0.5, -0.5, geometry.distance(px, py));
            }
        });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(w: u32, h: u32) -> Dimensions {
        Dimensions::new(w, h, 1.0)
    }

    #[test]
    fn freehand_covers_its_path_and_not_far_pixels() {
        let mark = Mark::Freehand { points: vec![(10.0, 10.0), (40.0, 10.0)], width: 4.0 };
        let cov = rasterize_mark(&mark, &dims(64, 64));
        assert!(cov.get(25, 10) > 0.99);
        assert!(cov.get(25, 30) < 0.001);
    }

    #[test]
    fn single_point_paints_a_dot() {
        let mark = Mark::Freehand { points: vec![(20.0, 20.0)], width: 6.0 };
        let cov = rasterize_mark(&mark, &dims(64, 64));
        assert!(cov.get(20, 20) > 0.99);
        assert!(cov.get(30, 20) < 0.001);
    }

    #[test]
    fn empty_path_yields_empty_mask() {
        let mark = Mark::Freehand { points: Vec::new(), width: 3.0 };
        assert!(rasterize_mark(&mark, &dims(32, 32)).is_empty());
    }

    #[test]
    fn rectangle_is_an_outline() {
        let mark = Mark::Rectangle { from: (10.0, 10.0), to: (50.0, 40.0), width: 2.0 };
        let cov = rasterize_mark(&mark, &dims(64, 64));
        assert!(cov.get(30, 10) > 0.5);
        assert!(cov.get(10, 25) > 0.5);
        assert!(cov.get(30, 25) < 0.001);
    }

    #[test]
    fn ellipse_is_an_outline() {
        let mark = Mark::Ellipse { from: (0.0, 0.0), to: (60.0, 60.0), width: 2.0 };
        let cov = rasterize_mark(&mark, &dims(64, 64));
        assert!(cov.get(30, 0) > 0.3);
        assert!(cov.get(30, 30) < 0.001);
    }

    #[test]
    fn arrow_has_a_filled_head() {
        let mark = Mark::Arrow { from: (5.0, 30.0), to: (60.0, 30.0), width: 2.0 };
        let cov = rasterize_mark(&mark, &dims(64, 64));
        // Inside the head, well away from the shaft radius.
        assert!(cov.get(53, 31) > 0.99);
        // Beside the shaft, outside the head.
        assert!(cov.get(20, 36) < 0.001);
    }

    #[test]
    fn coverage_is_clipped_to_the_buffer() {
        let mark = Mark::Freehand { points: vec![(-20.0, -20.0), (100.0, 100.0)], width: 10.0 };
        let cov = rasterize_mark(&mark, &dims(32, 16));
        assert!(cov.x0 + cov.width <= 32);
        assert!(cov.y0 + cov.height <= 16);
    }

    #[test]
    fn dpr_scales_geometry() {
        let mark = Mark::Freehand { points: vec![(10.0, 10.0)], width: 2.0 };
        let cov = rasterize_mark(&mark, &Dimensions::new(32, 32, 2.0));
        assert!(cov.get(20, 20) > 0.99);
        assert!(cov.get(10, 10) < 0.001);
    }

    #[test]
    fn growing_a_mask_segment_by_segment_matches_the_whole_path() {
        let d = Dimensions::new(80, 60, 1.5);
        let points = vec![(5.0, 5.0), (30.0, 12.0), (31.0, 40.0), (70.0, 55.0)];
        let whole = rasterize_mark(&Mark::Freehand { points: points.clone(), width: 5.0 }, &d);

        let mut grown = Coverage::blank(&d);
        paint_segment(&mut grown, points[0], points[0], 5.0, &d);
        for w in points.windows(2) {
            paint_segment(&mut grown, w[0], w[1], 5.0, &d);
        }
        for y in 0..d.physical_height {
            for x in 0..d.physical_width {
                assert_eq!(whole.get(x, y), grown.get(x, y), "({x}, {y})");
            }
        }
    }

    #[test]
    fn long_strokes_only_touch_pixels_near_the_path() {
        // A dense zig-zag across a large buffer: each segment must only be
        // evaluated inside its own bounds for this to stay fast.
        let d = Dimensions::new(800, 400, 2.0);
        let points: Vec<(f32, f32)> = (0..1500)
            .map(|i| (i as f32 * 0.53, if i % 2 == 0 { 20.0 } else { 380.0 }))
            .collect();
        let started = std::time::Instant::now();
        let cov = rasterize_mark(&Mark::Freehand { points, width: 3.0 }, &d);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(cov.get(0, 40) > 0.99);
        assert!(cov.get(1599, 799) < 0.001);
    }
}
