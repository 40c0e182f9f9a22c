use std::path::{Path, PathBuf};

use image::Rgba;

use crate::components::history::{DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_STEPS};
use crate::components::tools::{DEFAULT_COLOR, DEFAULT_STROKE_WIDTH, format_color, parse_color};
use crate::session::SessionOptions;

/// Settings that persist across runs.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotateSettings {
    /// Backing-buffer pixels per logical pixel.
    pub device_pixel_ratio: f32,
    /// Maximum number of undo steps
    pub max_undo_steps: usize,
    /// History memory cap in megabytes (0 = unlimited)
    pub max_history_mb: usize,
    pub default_color: Rgba<u8>,
    pub default_stroke_width: u32,
    /// Font family for text annotations
    pub font_family: String,
    /// Where `DirectoryUploader` stores exported evidence. Empty = next to the output.
    pub upload_dir: String,
}

impl Default for AnnotateSettings {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            max_undo_steps: DEFAULT_MAX_STEPS,
            max_history_mb: DEFAULT_MAX_MEMORY_BYTES / (1024 * 1024),
            default_color: DEFAULT_COLOR,
            default_stroke_width: DEFAULT_STROKE_WIDTH,
            font_family: "sans-serif".to_string(),
            upload_dir: String::new(),
        }
    }
}

impl AnnotateSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/qa-annotate/qa_annotate_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\qa-annotate\qa_annotate_settings.cfg
    /// On macOS:   ~/Library/Application Support/qa-annotate/qa_annotate_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("qa-annotate").join("qa_annotate_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("qa-annotate")
                    .join("qa_annotate_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("qa-annotate").join("qa_annotate_settings.cfg"))
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        crate::log_info!("Settings loaded from {}", path.display());
        Self::parse(&content)
    }

    /// Load the settings file, writing one with the defaults on first run so
    /// users have something to edit.
    pub fn load_or_init() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_or_init_at(&path),
            None => Self::default(),
        }
    }

    pub fn load_or_init_at(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        match settings.save_to(path) {
            Ok(()) => crate::log_info!("Wrote default settings to {}", path.display()),
            Err(e) => crate::log_warn!("Could not write default settings to {}: {}", path.display(), e),
        }
        settings
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values keep
    /// their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "device_pixel_ratio" => {
                    s.device_pixel_ratio = val
                        .parse::<f32>()
                        .ok()
                        .filter(|v| v.is_finite() && *v > 0.0)
                        .unwrap_or(1.0);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(DEFAULT_MAX_STEPS).max(1);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(s.max_history_mb);
                }
                "default_color" => {
                    if let Ok(c) = parse_color(val) {
                        s.default_color = c;
                    }
                }
                "default_stroke_width" => {
                    s.default_stroke_width = val.parse().unwrap_or(DEFAULT_STROKE_WIDTH);
                }
                "font_family" => {
                    if !val.is_empty() {
                        s.font_family = val.to_string();
                    }
                }
                "upload_dir" => {
                    s.upload_dir = val.to_string();
                }
                other => {
                    crate::log_warn!("Settings: ignoring unknown key '{}'", other);
                }
            }
        }
        s
    }

    /// Serialize to the `key=value` format read by [`AnnotateSettings::parse`].
    pub fn to_config_string(&self) -> String {
        format!(
            "device_pixel_ratio={}\n\
             max_undo_steps={}\n\
             max_history_mb={}\n\
             default_color={}\n\
             default_stroke_width={}\n\
             font_family={}\n\
             upload_dir={}\n",
            self.device_pixel_ratio,
            self.max_undo_steps,
            self.max_history_mb,
            format_color(self.default_color),
            self.default_stroke_width,
            self.font_family,
            self.upload_dir,
        )
    }

    /// Save settings to disk
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            device_pixel_ratio: self.device_pixel_ratio,
            max_undo_steps: self.max_undo_steps,
            max_history_bytes: match self.max_history_mb {
                0 => None,
                mb => Some(mb.saturating_mul(1024 * 1024)),
            },
            color: self.default_color,
            stroke_width: self.default_stroke_width,
        }
    }
}
