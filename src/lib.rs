//! Screenshot annotation for QA evidence: fit an image to a drawing area,
//! mark it up with strokes, shapes, arrows and text, step back and forth
//! through full-buffer history, and export a lossless PNG.
//!
//! The entry point is [`AnnotationSession`]. Screenshot capture and evidence
//! storage are reached through the [`ScreenshotCapture`] and
//! [`EvidenceUploader`] traits.

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod capture;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;
pub mod upload;

pub use canvas::{Dimensions, Surface};
pub use capture::{CaptureRequest, ScreenshotCapture};
pub use components::history::HistoryManager;
pub use components::tools::{Tool, ToolState};
pub use error::{AnnotateError, Result};
pub use io::{Blob, ContainerSize, ImageSource, RemoteFetcher};
pub use session::{AnnotationSession, SessionOptions};
pub use settings::AnnotateSettings;
pub use upload::{DirectoryUploader, EvidenceUploader};
