use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, RgbaImage};

use crate::canvas::{Dimensions, Surface, sanitize_dpr};
use crate::error::{AnnotateError, Result};

/// Fallback available area when no container size is known.
pub const DEFAULT_MAX_WIDTH: u32 = 1200;
pub const DEFAULT_MAX_HEIGHT: u32 = 800;

/// Horizontal and vertical editor chrome around the drawing area.
const EDITOR_H_PADDING: u32 = 64;
const EDITOR_V_PADDING: u32 = 160;
/// The drawing area never shrinks below this in either direction.
const EDITOR_MIN_AREA: u32 = 200;

pub const PNG_MIME: &str = "image/png";

// ============================================================================
// IMAGE SOURCES
// ============================================================================

/// Where an evidence image comes from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// Encoded image bytes already in memory (an uploaded blob).
    Bytes(Vec<u8>),
    /// A remote URL or an inline `data:` URI.
    Url(String),
    /// A file on disk.
    Path(PathBuf),
}

impl ImageSource {
    pub fn is_data_uri(&self) -> bool {
        matches!(self, ImageSource::Url(u) if u.trim_start().starts_with("data:"))
    }
}

/// Credentials policy for a remote image request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialsMode {
    /// No cookies or auth headers; the response must allow cross-origin use.
    Anonymous,
}

/// Retrieves remote image bytes. Implemented by whatever HTTP stack the
/// host application uses; this crate never performs network I/O itself.
pub trait RemoteFetcher {
    fn fetch(&self, url: &str, credentials: CredentialsMode) -> Result<Vec<u8>>;
}

/// Fetcher for hosts without network access: every remote URL fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineFetcher;

impl RemoteFetcher for OfflineFetcher {
    fn fetch(&self, url: &str, _credentials: CredentialsMode) -> Result<Vec<u8>> {
        Err(AnnotateError::Fetch(format!("remote sources are unavailable offline: {}", url)))
    }
}

/// Decode the payload of a `data:[<mime>][;base64],<data>` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| AnnotateError::Decode("not a data: URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AnnotateError::Decode("data: URI has no payload".into()))?;
    if meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| AnnotateError::Decode(format!("bad base64 payload: {}", e)))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

// ============================================================================
// FIT-TO-CONTAINER
// ============================================================================

/// Area available for the drawing surface, in logical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Derive the drawing area from the editor dialog's viewport, leaving
    /// room for the header and toolbar.
    pub fn from_editor_viewport(width: u32, height: u32) -> Self {
        Self {
            width: width.saturating_sub(EDITOR_H_PADDING).max(EDITOR_MIN_AREA),
            height: height.saturating_sub(EDITOR_V_PADDING).max(EDITOR_MIN_AREA),
        }
    }

    /// Parse `WIDTHxHEIGHT`, e.g. `800x600`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let w = w.trim().parse().ok()?;
        let h = h.trim().parse().ok()?;
        Some(Self::new(w, h))
    }
}

/// `min(1, min(aw / nw, ah / nh))`: shrink to fit, never enlarge.
pub fn fit_scale(natural: (u32, u32), available: ContainerSize) -> f32 {
    if natural.0 == 0 || natural.1 == 0 {
        return 1.0;
    }
    let sx = available.width as f64 / natural.0 as f64;
    let sy = available.height as f64 / natural.1 as f64;
    sx.min(sy).min(1.0) as f32
}

/// Logical and physical surface size for an image of `natural` size.
/// Without a container the image is capped at 1200×800.
pub fn fit_dimensions(natural: (u32, u32), container: Option<ContainerSize>, dpr: f32) -> Dimensions {
    let available = container.unwrap_or(ContainerSize {
        width: natural.0.min(DEFAULT_MAX_WIDTH),
        height: natural.1.min(DEFAULT_MAX_HEIGHT),
    });
    let scale = fit_scale(natural, available) as f64;
    let logical_w = (natural.0 as f64 * scale).round() as u32;
    let logical_h = (natural.1 as f64 * scale).round() as u32;
    Dimensions::new(logical_w, logical_h, sanitize_dpr(dpr))
}

// ============================================================================
// IMAGE LOADER
// ============================================================================

/// A decoded source image plus the surface size it should be drawn at.
pub struct LoadedImage {
    pub original: RgbaImage,
    pub dimensions: Dimensions,
}

/// Decode encoded image bytes into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| AnnotateError::Decode(e.to_string()))?
        .to_rgba8();
    Ok(img)
}

/// Read the raw bytes behind a source. Data URIs are decoded in place and
/// never reach the fetcher; other URLs are fetched anonymously.
pub fn read_source(source: &ImageSource, fetcher: &dyn RemoteFetcher) -> Result<Vec<u8>> {
    match source {
        ImageSource::Bytes(b) => Ok(b.clone()),
        ImageSource::Path(p) => Ok(std::fs::read(p)?),
        ImageSource::Url(u) if source.is_data_uri() => decode_data_uri(u),
        ImageSource::Url(u) => fetcher.fetch(u, CredentialsMode::Anonymous),
    }
}

/// Load and size an image for annotation.
///
/// Fails with `Decode`/`Fetch`/`Io` when the source can't be read and with
/// `EmptyImage` for a zero-area image.
pub fn load_image(
    source: &ImageSource,
    container: Option<ContainerSize>,
    dpr: f32,
    fetcher: &dyn RemoteFetcher,
) -> Result<LoadedImage> {
    let bytes = read_source(source, fetcher)?;
    let original = decode_image(&bytes)?;
    prepare_image(original, container, dpr)
}

/// Size an already-decoded image for annotation.
pub fn prepare_image(original: RgbaImage, container: Option<ContainerSize>, dpr: f32) -> Result<LoadedImage> {
    let natural = original.dimensions();
    if natural.0 == 0 || natural.1 == 0 {
        return Err(AnnotateError::EmptyImage);
    }
    let dimensions = fit_dimensions(natural, container, dpr);
    if dimensions.is_empty() {
        return Err(AnnotateError::EmptyImage);
    }
    crate::log_info!(
        "Loaded image {}x{} -> logical {}x{}, physical {}x{} (dpr {})",
        natural.0,
        natural.1,
        dimensions.logical_width,
        dimensions.logical_height,
        dimensions.physical_width,
        dimensions.physical_height,
        dimensions.device_pixel_ratio
    );
    Ok(LoadedImage { original, dimensions })
}

// ============================================================================
// EXPORT
// ============================================================================

/// An encoded raster image handed to upload collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Losslessly encode an RGBA buffer as PNG. Encoder settings are fixed so
/// identical buffers always produce identical bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Blob> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AnnotateError::Export("surface has zero size".into()));
    }
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new_with_quality(&mut out, CompressionType::Default, FilterType::Adaptive)
        .write_image(image.as_raw(), width, height, image::ColorType::Rgba8)
        .map_err(|e| AnnotateError::Export(e.to_string()))?;
    let bytes = out.into_inner();
    if bytes.is_empty() {
        return Err(AnnotateError::Export("encoder produced no data".into()));
    }
    Ok(Blob { bytes, mime: PNG_MIME, width, height })
}

/// Export the full physical buffer of a surface as PNG.
pub fn export_png(surface: &Surface) -> Result<Blob> {
    encode_png(surface.pixels())
}

/// Write a blob to disk.
pub fn write_blob(blob: &Blob, path: &Path) -> Result<()> {
    std::fs::write(path, &blob.bytes)?;
    Ok(())
}
