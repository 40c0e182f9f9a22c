//! Contract with the evidence storage service.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{AnnotateError, Result};
use crate::io::Blob;

/// Stores a blob under an organizing folder (typically a project or QA
/// item id) and returns a URL anyone with access can resolve.
pub trait EvidenceUploader {
    fn upload(&self, folder: &str, blob: &Blob) -> Result<String>;
}

/// Uploader backed by a local directory. Each blob gets a fresh
/// `<root>/<folder>/<uuid>.<ext>` path and a `file://` URL.
#[derive(Clone, Debug)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Folder names may not escape the upload root.
fn is_safe_folder(folder: &str) -> bool {
    !folder.is_empty()
        && Path::new(folder)
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

impl EvidenceUploader for DirectoryUploader {
    fn upload(&self, folder: &str, blob: &Blob) -> Result<String> {
        if blob.is_empty() {
            return Err(AnnotateError::Upload("refusing to store an empty blob".into()));
        }
        if !is_safe_folder(folder) {
            return Err(AnnotateError::Upload(format!("invalid folder '{}'", folder)));
        }
        let dir = self.root.join(folder);
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension_for(blob.mime)));
        std::fs::create_dir_all(&dir)
            .and_then(|_| std::fs::write(&path, &blob.bytes))
            .map_err(|e| AnnotateError::Upload(format!("{}: {}", path.display(), e)))?;

        let absolute = path.canonicalize().unwrap_or(path);
        crate::log_info!("Uploaded {} bytes to {}", blob.len(), absolute.display());
        Ok(format!("file://{}", absolute.display()))
    }
}
