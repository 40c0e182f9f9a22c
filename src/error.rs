//! Error type shared by every fallible annotation operation.
//!
//! Expected steady states (undo at the base entry, redo with nothing to
//! redo, drawing before an image is loaded) are *not* errors and never
//! surface here.

/// Everything that can go wrong while loading, editing, exporting or
/// handing an annotated screenshot to a collaborator.
#[derive(Debug)]
pub enum AnnotateError {
    /// The image bytes could not be decoded.
    Decode(String),
    /// A remote image source could not be retrieved.
    Fetch(String),
    /// The decoded image has a zero width or height.
    EmptyImage,
    /// An operation that needs a loaded surface was called without one.
    NotInitialized,
    /// Serializing the pixel buffer produced no data.
    Export(String),
    /// Text insertion was requested but no font is available.
    FontUnavailable,
    /// A colour string could not be parsed.
    InvalidColor(String),
    /// The screenshot collaborator rejected or failed a capture.
    Capture(String),
    /// The upload collaborator failed to store a blob.
    Upload(String),
    /// An annotation command file could not be parsed.
    Script { line: usize, message: String },
    Io(std::io::Error),
}

impl std::fmt::Display for AnnotateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotateError::Decode(e) => write!(f, "Image decode error: {}", e),
            AnnotateError::Fetch(e) => write!(f, "Image fetch error: {}", e),
            AnnotateError::EmptyImage => write!(f, "Image has zero width or height"),
            AnnotateError::NotInitialized => write!(f, "Canvas not initialized"),
            AnnotateError::Export(e) => write!(f, "Export error: {}", e),
            AnnotateError::FontUnavailable => write!(f, "No font available for text annotations"),
            AnnotateError::InvalidColor(c) => write!(f, "Invalid color: '{}'", c),
            AnnotateError::Capture(e) => write!(f, "Screenshot capture error: {}", e),
            AnnotateError::Upload(e) => write!(f, "Upload error: {}", e),
            AnnotateError::Script { line, message } => {
                write!(f, "Script error on line {}: {}", line, message)
            }
            AnnotateError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for AnnotateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnnotateError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AnnotateError {
    fn from(e: std::io::Error) -> Self {
        AnnotateError::Io(e)
    }
}

impl From<image::ImageError> for AnnotateError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => AnnotateError::Io(io),
            other => AnnotateError::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
