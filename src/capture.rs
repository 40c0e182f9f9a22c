//! Contract with the headless-browser screenshot service.
//!
//! The browser itself lives outside this crate. What lives here is the
//! request shape, its defaults and validation, and the clip step that turns
//! a rendered page into exactly the region the user was looking at.

use image::RgbaImage;

use crate::error::{AnnotateError, Result};
use crate::io::Blob;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;
/// Navigation budget the capture service is expected to honour.
pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// A screenshot of `url`, clipped to the viewport rectangle at (x, y).
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub device_scale_factor: f32,
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
            x: 0,
            y: 0,
            device_scale_factor: 1.0,
        }
    }

    /// Fill in defaults for zero sizes and a bad scale factor, then reject
    /// requests without a URL.
    pub fn validate(mut self) -> Result<Self> {
        if self.url.trim().is_empty() {
            return Err(AnnotateError::Capture("URL is required".into()));
        }
        if self.width == 0 {
            self.width = DEFAULT_VIEWPORT_WIDTH;
        }
        if self.height == 0 {
            self.height = DEFAULT_VIEWPORT_HEIGHT;
        }
        if !(self.device_scale_factor.is_finite() && self.device_scale_factor > 0.0) {
            self.device_scale_factor = 1.0;
        }
        Ok(self)
    }

    /// The clip rectangle in rendered (device) pixels: (x, y, w, h).
    pub fn device_clip(&self) -> (u32, u32, u32, u32) {
        let s = self.device_scale_factor;
        let scale = |v: u32| (v as f32 * s).round() as u32;
        (scale(self.x), scale(self.y), scale(self.width), scale(self.height))
    }
}

/// A service that renders a page and returns a PNG clipped to the request.
/// Navigation failures and timeouts come back as `AnnotateError::Capture`;
/// no retries are attempted on either side of this boundary.
pub trait ScreenshotCapture {
    fn capture(&self, request: &CaptureRequest) -> Result<Blob>;
}

/// Crop a full-page render to the requested region. The clip is
/// intersected with the page; an empty intersection is an error.
pub fn clip_capture(page: &RgbaImage, request: &CaptureRequest) -> Result<RgbaImage> {
    let (x, y, w, h) = request.device_clip();
    let (pw, ph) = page.dimensions();
    if x >= pw || y >= ph {
        return Err(AnnotateError::Capture(format!(
            "clip origin ({}, {}) lies outside the {}x{} page",
            x, y, pw, ph
        )));
    }
    let w = w.min(pw - x);
    let h = h.min(ph - y);
    if w == 0 || h == 0 {
        return Err(AnnotateError::Capture("clip region is empty".into()));
    }
    Ok(image::imageops::crop_imm(page, x, y, w, h).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn missing_url_is_rejected() {
        let err = CaptureRequest::new("  ").validate();
        assert!(matches!(err, Err(AnnotateError::Capture(_))));
    }

    #[test]
    fn zero_sizes_fall_back_to_defaults() {
        let mut req = CaptureRequest::new("https://app.example/projects/1");
        req.width = 0;
        req.height = 0;
        req.device_scale_factor = 0.0;
        let req = req.validate().ok();
        assert_eq!(req.as_ref().map(|r| (r.width, r.height)), Some((1280, 800)));
        assert_eq!(req.map(|r| r.device_scale_factor), Some(1.0));
    }

    #[test]
    fn clip_respects_scale_factor() {
        let page = RgbaImage::from_fn(200, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let mut req = CaptureRequest::new("https://a.example");
        req.x = 10;
        req.y = 20;
        req.width = 30;
        req.height = 40;
        req.device_scale_factor = 2.0;
        let clipped = clip_capture(&page, &req).ok();
        assert_eq!(clipped.as_ref().map(|c| c.dimensions()), Some((60, 80)));
        assert_eq!(clipped.map(|c| *c.get_pixel(0, 0)), Some(Rgba([20, 40, 0, 255])));
    }

    #[test]
    fn clip_is_trimmed_to_the_page() {
        let page = RgbaImage::new(100, 50);
        let req = CaptureRequest::new("https://a.example");
        let clipped = clip_capture(&page, &req).ok();
        assert_eq!(clipped.map(|c| c.dimensions()), Some((100, 50)));
    }

    #[test]
    fn clip_outside_the_page_fails() {
        let page = RgbaImage::new(100, 50);
        let mut req = CaptureRequest::new("https://a.example");
        req.y = 60;
        assert!(clip_capture(&page, &req).is_err());
    }
}
