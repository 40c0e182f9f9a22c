use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{Dimensions, Surface};
use crate::components::history::{DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_STEPS, HistoryManager};
use crate::components::tools::{Tool, ToolState, parse_color};
use crate::error::{AnnotateError, Result};
use crate::io::{self, Blob, ContainerSize, ImageSource, OfflineFetcher, RemoteFetcher};
use crate::ops::shapes::{Coverage, Mark, paint_segment, rasterize_mark};
use crate::ops::text::rasterize_text;

/// Literal inserted by the toolbar's text button.
pub const PLACEHOLDER_TEXT: &str = "Texto";
/// Logical baseline origin of the placeholder text.
pub const PLACEHOLDER_ANCHOR: (f32, f32) = (30.0, 60.0);

/// Tunables applied to every session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOptions {
    pub device_pixel_ratio: f32,
    pub max_undo_steps: usize,
    pub max_history_bytes: Option<usize>,
    pub color: Rgba<u8>,
    pub stroke_width: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let tools = ToolState::default();
        Self {
            device_pixel_ratio: 1.0,
            max_undo_steps: DEFAULT_MAX_STEPS,
            max_history_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            color: tools.color(),
            stroke_width: tools.stroke_width(),
        }
    }
}

/// A press-drag in progress. Tool, colour and width are frozen at press.
#[derive(Clone, Debug)]
struct ActiveStroke {
    tool: Tool,
    color: Rgba<u8>,
    width: f32,
    points: Vec<(f32, f32)>,
    /// Brush and eraser coverage so far, grown one segment per move.
    mask: Option<Coverage>,
}

impl ActiveStroke {
    fn is_freehand(&self) -> bool {
        matches!(self.tool, Tool::Brush | Tool::Eraser)
    }

    /// The mark this stroke would commit, or `None` if it paints nothing.
    fn to_mark(&self) -> Option<Mark> {
        let first = *self.points.first()?;
        let last = *self.points.last()?;
        let width = self.width;
        let dragged = first != last;
        match self.tool {
            Tool::Brush | Tool::Eraser => Some(Mark::Freehand { points: self.points.clone(), width }),
            Tool::Rectangle if dragged => Some(Mark::Rectangle { from: first, to: last, width }),
            Tool::Circle if dragged => Some(Mark::Ellipse { from: first, to: last, width }),
            Tool::Arrow if dragged => Some(Mark::Arrow { from: first, to: last, width }),
            _ => None,
        }
    }
}

// ============================================================================
// ANNOTATION SESSION
// ============================================================================

/// One screenshot-annotation workflow: the surface, its history, the tool
/// state and the original image. Created per editor invocation and torn
/// down by [`AnnotationSession::close`]; nothing is shared across sessions.
///
/// Every mutating call is a silent no-op until an image has loaded.
pub struct AnnotationSession {
    id: Uuid,
    options: SessionOptions,
    surface: Option<Surface>,
    /// Decoded source image, kept for `clear()`.
    original: Option<RgbaImage>,
    /// The original as first drawn into the buffer; the eraser blends toward it.
    pristine: Option<RgbaImage>,
    history: HistoryManager,
    tools: ToolState,
    font: Option<FontArc>,
    stroke: Option<ActiveStroke>,
    fetcher: Box<dyn RemoteFetcher>,
}

impl Default for AnnotationSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl AnnotationSession {
    pub fn new(options: SessionOptions) -> Self {
        let mut tools = ToolState::default();
        tools.set_color(options.color);
        tools.set_stroke_width(options.stroke_width);
        Self {
            id: Uuid::new_v4(),
            options,
            surface: None,
            original: None,
            pristine: None,
            history: HistoryManager::new(options.max_undo_steps)
                .with_memory_limit(options.max_history_bytes),
            tools,
            font: None,
            stroke: None,
            fetcher: Box::new(OfflineFetcher),
        }
    }

    /// Use `fetcher` for remote (non-data) image URLs.
    pub fn with_fetcher(mut self, fetcher: Box<dyn RemoteFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Font for text annotations.
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ---- loading ------------------------------------------------------------

    /// Load a new image, discarding any previous surface and history first.
    /// On failure the session is left without a surface.
    pub fn load(&mut self, source: &ImageSource, container: Option<ContainerSize>) -> Result<()> {
        self.reset();
        let loaded = io::load_image(source, container, self.options.device_pixel_ratio, self.fetcher.as_ref())
            .inspect_err(|e| crate::log_err!("Session {}: image load failed: {}", self.id, e))?;
        self.install(loaded);
        Ok(())
    }

    /// Load an image that is already decoded (e.g. a fresh capture).
    pub fn load_decoded(&mut self, image: RgbaImage, container: Option<ContainerSize>) -> Result<()> {
        self.reset();
        let loaded = io::prepare_image(image, container, self.options.device_pixel_ratio)
            .inspect_err(|e| crate::log_err!("Session {}: image rejected: {}", self.id, e))?;
        self.install(loaded);
        Ok(())
    }

    fn install(&mut self, loaded: io::LoadedImage) {
        let mut surface = Surface::new(loaded.dimensions);
        surface.draw_image(&loaded.original);
        self.history.seed(&surface);
        self.pristine = Some(surface.pixels().clone());
        self.original = Some(loaded.original);
        self.surface = Some(surface);
    }

    /// Drop the surface, history and any stroke in progress.
    pub fn reset(&mut self) {
        self.surface = None;
        self.original = None;
        self.pristine = None;
        self.stroke = None;
        self.history.clear();
    }

    /// End the session. Nothing is persisted unless the caller already
    /// exported and saved.
    pub fn close(self) {
        crate::log_info!(
            "Session {} closed ({} undo steps discarded)",
            self.id,
            self.history.undo_count()
        );
    }

    pub fn is_loaded(&self) -> bool {
        self.surface.is_some()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.surface.as_ref().map(Surface::dimensions)
    }

    /// Current physical pixel buffer.
    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.surface.as_ref().map(Surface::pixels)
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    // ---- tool state -----------------------------------------------------------

    pub fn tool(&self) -> Tool {
        self.tools.tool()
    }

    pub fn color(&self) -> Rgba<u8> {
        self.tools.color()
    }

    pub fn stroke_width(&self) -> u32 {
        self.tools.stroke_width()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tools.set_tool(tool);
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.tools.set_color(color);
    }

    /// Parse and set a CSS-style colour.
    pub fn set_color_str(&mut self, color: &str) -> Result<()> {
        self.tools.set_color(parse_color(color)?);
        Ok(())
    }

    pub fn set_stroke_width(&mut self, width: u32) {
        self.tools.set_stroke_width(width);
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- pointer interaction ------------------------------------------------

    /// Pointer pressed at a logical position.
    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        let Some(dims) = self.dimensions() else { return };
        let mut stroke = ActiveStroke {
            tool: self.tools.tool(),
            color: self.tools.color(),
            width: self.tools.stroke_width() as f32,
            points: vec![(x, y)],
            mask: None,
        };
        if stroke.is_freehand() {
            let mut mask = Coverage::blank(&dims);
            paint_segment(&mut mask, (x, y), (x, y), stroke.width, &dims);
            stroke.mask = Some(mask);
        }
        self.stroke = Some(stroke);
    }

    /// Pointer moved while pressed. Brush and eraser rasterize only the new
    /// segment.
    pub fn extend_stroke(&mut self, x: f32, y: f32) {
        let Some(dims) = self.dimensions() else { return };
        let Some(stroke) = self.stroke.as_mut() else { return };
        if stroke.is_freehand() {
            let last = stroke.points.last().copied().unwrap_or((x, y));
            stroke.points.push((x, y));
            if let Some(mask) = stroke.mask.as_mut() {
                paint_segment(mask, last, (x, y), stroke.width, &dims);
            }
        } else {
            // Shapes only need the press point and the latest point.
            stroke.points.truncate(1);
            stroke.points.push((x, y));
        }
    }

    /// Pointer released: apply the stroke and checkpoint.
    ///
    /// Returns `Ok(true)` when pixels changed and a history entry was added.
    /// Select, zero-size shapes and calls without a loaded image return
    /// `Ok(false)`.
    pub fn end_stroke(&mut self) -> Result<bool> {
        let Some(stroke) = self.stroke.take() else { return Ok(false) };
        if self.surface.is_none() {
            return Ok(false);
        }
        if stroke.tool == Tool::Text {
            let anchor = stroke.points.last().copied().unwrap_or(PLACEHOLDER_ANCHOR);
            self.add_text_at(PLACEHOLDER_TEXT, anchor)?;
            return Ok(true);
        }
        if let Some(mask) = &stroke.mask {
            return Ok(self.apply_coverage(mask, stroke.tool, stroke.color));
        }
        let Some(mark) = stroke.to_mark() else { return Ok(false) };
        Ok(self.apply_mark(&mark, stroke.tool, stroke.color))
    }

    /// Abandon the stroke in progress without touching the buffer.
    pub fn cancel_stroke(&mut self) {
        self.stroke = None;
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// The buffer with the in-progress stroke drawn on top, for display.
    /// The real buffer and history are untouched.
    pub fn preview(&self) -> Option<RgbaImage> {
        let surface = self.surface.as_ref()?;
        let mut scratch = surface.clone();
        if let Some(stroke) = &self.stroke {
            if let Some(mask) = &stroke.mask {
                self.paint(&mut scratch, mask, stroke.tool, stroke.color);
            } else if let Some(mark) = stroke.to_mark() {
                let coverage = rasterize_mark(&mark, &scratch.dimensions());
                self.paint(&mut scratch, &coverage, stroke.tool, stroke.color);
            }
        }
        Some(scratch.pixels().clone())
    }

    /// Rasterize and commit a mark with an explicit tool and colour.
    /// Used by pointer strokes and by scripted annotation.
    pub fn apply_mark(&mut self, mark: &Mark, tool: Tool, color: Rgba<u8>) -> bool {
        let Some(dims) = self.dimensions() else { return false };
        if !tool.mutates() {
            return false;
        }
        let coverage = rasterize_mark(mark, &dims);
        self.apply_coverage(&coverage, tool, color)
    }

    /// Paint an already rasterized mask with `tool` and checkpoint. Every
    /// committed mutation (strokes, shapes, text) ends here.
    pub fn apply_coverage(&mut self, coverage: &Coverage, tool: Tool, color: Rgba<u8>) -> bool {
        if !tool.mutates() {
            return false;
        }
        let Some(mut surface) = self.surface.take() else { return false };
        self.paint(&mut surface, coverage, tool, color);
        self.history.checkpoint(&surface);
        self.surface = Some(surface);
        true
    }

    fn paint(&self, surface: &mut Surface, coverage: &Coverage, tool: Tool, color: Rgba<u8>) {
        match (tool, self.pristine.as_ref()) {
            (Tool::Eraser, Some(pristine)) => surface.restore_toward(pristine, coverage),
            (Tool::Eraser, None) => {}
            _ => surface.composite(coverage, color),
        }
    }

    // ---- discrete actions ---------------------------------------------------

    /// Insert the placeholder text at its fixed anchor.
    pub fn add_text(&mut self) -> Result<()> {
        self.add_text_at(PLACEHOLDER_TEXT, PLACEHOLDER_ANCHOR)
    }

    /// Insert `text` with its first baseline starting at the logical
    /// `anchor`, in the current colour at `24 + stroke_width` px.
    pub fn add_text_at(&mut self, text: &str, anchor: (f32, f32)) -> Result<()> {
        let Some(dims) = self.dimensions() else { return Ok(()) };
        let font = self.font.as_ref().ok_or(AnnotateError::FontUnavailable)?;
        let coverage = rasterize_text(font, text, self.tools.font_size(), anchor, &dims);
        self.apply_coverage(&coverage, Tool::Text, self.tools.color());
        Ok(())
    }

    /// Step back one checkpoint. No-op at the base image.
    pub fn undo(&mut self) -> bool {
        match self.surface.as_mut() {
            Some(surface) => self.history.undo(surface),
            None => false,
        }
    }

    /// Re-apply the last undone checkpoint. No-op if nothing was undone.
    pub fn redo(&mut self) -> bool {
        match self.surface.as_mut() {
            Some(surface) => self.history.redo(surface),
            None => false,
        }
    }

    /// Discard every annotation by redrawing the original image, then
    /// checkpoint. History keeps its entries; this adds exactly one.
    pub fn clear(&mut self) {
        let (Some(surface), Some(original)) = (self.surface.as_mut(), self.original.as_ref()) else {
            return;
        };
        surface.draw_image(original);
        self.history.checkpoint(surface);
    }

    /// Encode the current buffer as PNG.
    pub fn export_image(&self) -> Result<Blob> {
        let surface = self.surface.as_ref().ok_or(AnnotateError::NotInitialized)?;
        let blob = io::export_png(surface)
            .inspect_err(|e| crate::log_err!("Session {}: export failed: {}", self.id, e))?;
        crate::log_info!("Session {}: exported {} bytes", self.id, blob.len());
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_session(w: u32, h: u32) -> AnnotationSession {
        let mut session = AnnotationSession::default();
        let img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        assert!(session.load_decoded(img, None).is_ok());
        session
    }

    fn drag(session: &mut AnnotationSession, from: (f32, f32), to: (f32, f32)) -> bool {
        session.begin_stroke(from.0, from.1);
        session.extend_stroke((from.0 + to.0) * 0.5, (from.1 + to.1) * 0.5);
        session.extend_stroke(to.0, to.1);
        session.end_stroke().unwrap_or(false)
    }

    #[test]
    fn mutations_before_load_are_noops() {
        let mut session = AnnotationSession::default();
        session.begin_stroke(1.0, 1.0);
        assert!(!session.is_stroking());
        assert!(!session.end_stroke().unwrap_or(true));
        assert!(!session.undo());
        assert!(!session.redo());
        session.clear();
        assert!(session.add_text().is_ok());
        assert!(session.pixels().is_none());
        assert!(matches!(session.export_image(), Err(AnnotateError::NotInitialized)));
    }

    #[test]
    fn select_tool_never_checkpoints() {
        let mut session = loaded_session(32, 32);
        session.set_tool(Tool::Select);
        assert!(!drag(&mut session, (2.0, 2.0), (20.0, 20.0)));
        assert!(!session.can_undo());
    }

    #[test]
    fn click_without_drag_draws_no_shape() {
        let mut session = loaded_session(32, 32);
        session.set_tool(Tool::Rectangle);
        session.begin_stroke(5.0, 5.0);
        assert!(!session.end_stroke().unwrap_or(true));
        assert!(!session.can_undo());
    }

    #[test]
    fn brush_click_paints_a_dot() {
        let mut session = loaded_session(32, 32);
        session.set_color(Rgba([0, 0, 255, 255]));
        session.set_stroke_width(6);
        session.begin_stroke(10.0, 10.0);
        assert!(session.end_stroke().unwrap_or(false));
        assert_eq!(session.pixels().map(|p| *p.get_pixel(10, 10)), Some(Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn stroke_settings_are_frozen_at_press() {
        let mut session = loaded_session(32, 32);
        session.set_color(Rgba([0, 255, 0, 255]));
        session.begin_stroke(4.0, 4.0);
        session.set_color(Rgba([255, 0, 0, 255]));
        session.extend_stroke(20.0, 4.0);
        assert!(session.end_stroke().unwrap_or(false));
        assert_eq!(session.pixels().map(|p| *p.get_pixel(12, 4)), Some(Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn preview_does_not_touch_the_buffer() {
        let mut session = loaded_session(32, 32);
        session.set_tool(Tool::Arrow);
        session.begin_stroke(2.0, 16.0);
        session.extend_stroke(30.0, 16.0);
        let before = session.pixels().cloned();
        let preview = session.preview();
        assert_ne!(preview, before);
        assert_eq!(session.pixels().cloned(), before);
        session.cancel_stroke();
        assert!(!session.can_undo());
    }

    #[test]
    fn eraser_restores_the_image_under_annotations() {
        let mut session = AnnotationSession::default();
        let img = RgbaImage::from_fn(40, 40, |x, y| Rgba([x as u8 * 5, y as u8 * 5, 100, 255]));
        assert!(session.load_decoded(img.clone(), None).is_ok());
        session.set_stroke_width(8);
        assert!(drag(&mut session, (5.0, 20.0), (35.0, 20.0)));
        assert_ne!(session.pixels().map(|p| p.as_raw().clone()), Some(img.as_raw().clone()));

        session.set_tool(Tool::Eraser);
        session.set_stroke_width(20);
        assert!(drag(&mut session, (0.0, 20.0), (40.0, 20.0)));
        assert_eq!(session.pixels().map(|p| p.as_raw().clone()), Some(img.as_raw().clone()));
    }

    #[test]
    fn eraser_on_clean_image_changes_nothing() {
        let mut session = loaded_session(16, 16);
        let base = session.pixels().cloned();
        session.set_tool(Tool::Eraser);
        assert!(drag(&mut session, (0.0, 0.0), (16.0, 16.0)));
        assert_eq!(session.pixels().cloned(), base);
        assert!(session.can_undo());
    }

    #[test]
    fn text_without_font_is_reported() {
        let mut session = loaded_session(64, 64);
        assert!(matches!(session.add_text(), Err(AnnotateError::FontUnavailable)));
        assert!(!session.can_undo());
    }

    #[test]
    fn failed_load_clears_previous_image() {
        let mut session = loaded_session(8, 8);
        let result = session.load(&ImageSource::Bytes(b"not an image".to_vec()), None);
        assert!(matches!(result, Err(AnnotateError::Decode(_))));
        assert!(!session.is_loaded());
        assert!(!session.can_undo() && !session.can_redo());
    }

    #[test]
    fn set_color_str_rejects_bad_input() {
        let mut session = AnnotationSession::default();
        assert!(session.set_color_str("#00ff00").is_ok());
        assert_eq!(session.color(), Rgba([0, 255, 0, 255]));
        assert!(session.set_color_str("nope").is_err());
        assert_eq!(session.color(), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let mut session = loaded_session(8, 8);
        let result = session.load_decoded(RgbaImage::new(0, 10), None);
        assert!(matches!(result, Err(AnnotateError::EmptyImage)));
        assert!(!session.is_loaded());
        assert!(!session.can_undo());
        assert!(matches!(session.export_image(), Err(AnnotateError::NotInitialized)));
    }

    #[test]
    fn coverage_commit_paints_and_checkpoints() {
        let mut session = loaded_session(20, 20);
        let mask = Coverage { x0: 4, y0: 6, width: 3, height: 2, values: vec![1.0; 6] };
        assert!(session.apply_coverage(&mask, Tool::Text, Rgba([0, 0, 0, 255])));
        assert!(session.can_undo());
        let pixels = session.pixels().cloned().unwrap_or_default();
        assert_eq!(*pixels.get_pixel(5, 7), Rgba([0, 0, 0, 255]));
        assert_eq!(*pixels.get_pixel(8, 7), Rgba([255, 255, 255, 255]));

        assert!(session.undo());
        assert_eq!(session.pixels().map(|p| *p.get_pixel(5, 7)), Some(Rgba([255, 255, 255, 255])));
        assert!(!session.apply_coverage(&mask, Tool::Select, Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn brush_preview_matches_the_committed_stroke() {
        let mut session = AnnotationSession::new(SessionOptions { device_pixel_ratio: 2.0, ..Default::default() });
        assert!(session.load_decoded(RgbaImage::from_pixel(60, 40, Rgba([255, 255, 255, 255])), None).is_ok());
        session.set_stroke_width(5);
        session.begin_stroke(3.0, 3.0);
        for i in 1..200 {
            let t = i as f32 * 0.05;
            session.extend_stroke(3.0 + t * 5.0, 20.0 + 15.0 * t.sin());
        }
        let preview = session.preview();
        assert!(session.end_stroke().unwrap_or(false));
        assert_eq!(preview.as_ref(), session.pixels());
    }
}
