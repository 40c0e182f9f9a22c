use image::Rgba;

use crate::error::{AnnotateError, Result};

pub const MIN_STROKE_WIDTH: u32 = 1;
pub const MAX_STROKE_WIDTH: u32 = 20;
pub const DEFAULT_STROKE_WIDTH: u32 = 3;
/// Tailwind red-500, the toolbar's initial colour.
pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0xef, 0x44, 0x44, 0xff]);

// ============================================================================
// TOOL
// ============================================================================

/// The closed set of annotation tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    /// Pointer interactions do nothing.
    Select,
    #[default]
    Brush,
    Circle,
    Rectangle,
    Arrow,
    Eraser,
    /// Click places text at the pointer.
    Text,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Select,
            Tool::Brush,
            Tool::Circle,
            Tool::Rectangle,
            Tool::Arrow,
            Tool::Eraser,
            Tool::Text,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Brush => "brush",
            Tool::Circle => "circle",
            Tool::Rectangle => "rectangle",
            Tool::Arrow => "arrow",
            Tool::Eraser => "eraser",
            Tool::Text => "text",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        let name = name.trim().to_ascii_lowercase();
        Tool::all().iter().copied().find(|t| t.name() == name)
    }

    /// Whether a press-drag-release with this tool changes pixels.
    pub fn mutates(&self) -> bool {
        !matches!(self, Tool::Select)
    }
}

// ============================================================================
// TOOL STATE
// ============================================================================

/// Current tool, colour and stroke width. Not historized; only the pixels
/// these settings produce are.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolState {
    tool: Tool,
    color: Rgba<u8>,
    stroke_width: u32,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            color: DEFAULT_COLOR,
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

impl ToolState {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn stroke_width(&self) -> u32 {
        self.stroke_width
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.color = color;
    }

    /// Set the stroke width, clamped to `1..=20`.
    pub fn set_stroke_width(&mut self, width: u32) {
        self.stroke_width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }

    /// Font size used for text annotations.
    pub fn font_size(&self) -> f32 {
        24.0 + self.stroke_width as f32
    }
}

// ============================================================================
// COLOUR PARSING
// ============================================================================

/// Parse a CSS-style colour: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r,g,b)`,
/// `rgba(r,g,b,a)` (alpha 0.0–1.0) or one of a few common names.
pub fn parse_color(s: &str) -> Result<Rgba<u8>> {
    let raw = s.trim().to_ascii_lowercase();
    let invalid = || AnnotateError::InvalidColor(s.to_string());

    if let Some(hex) = raw.strip_prefix('#') {
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        // from_str_radix alone would accept a leading '+'
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        return match hex.len() {
            3 => Ok(Rgba([
                nibble(0).map_err(|_| invalid())?,
                nibble(1).map_err(|_| invalid())?,
                nibble(2).map_err(|_| invalid())?,
                255,
            ])),
            6 | 8 => {
                let a = if hex.len() == 8 { byte(6).map_err(|_| invalid())? } else { 255 };
                Ok(Rgba([
                    byte(0).map_err(|_| invalid())?,
                    byte(2).map_err(|_| invalid())?,
                    byte(4).map_err(|_| invalid())?,
                    a,
                ]))
            }
            _ => Err(invalid()),
        };
    }

    let functional = raw
        .strip_prefix("rgba(")
        .or_else(|| raw.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'));
    if let Some(args) = functional {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        let channel = |p: &str| p.parse::<u8>().map_err(|_| invalid());
        return match parts.as_slice() {
            [r, g, b] => Ok(Rgba([channel(r)?, channel(g)?, channel(b)?, 255])),
            [r, g, b, a] => {
                let a: f32 = a.parse().map_err(|_| invalid())?;
                if !(0.0..=1.0).contains(&a) {
                    return Err(invalid());
                }
                Ok(Rgba([channel(r)?, channel(g)?, channel(b)?, (a * 255.0).round() as u8]))
            }
            _ => Err(invalid()),
        };
    }

    let named = match raw.as_str() {
        "black" => [0, 0, 0, 255],
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        "orange" => [255, 165, 0, 255],
        "transparent" => [0, 0, 0, 0],
        _ => return Err(invalid()),
    };
    Ok(Rgba(named))
}

/// Format a colour as `#rrggbb`, or `#rrggbbaa` when not opaque.
pub fn format_color(c: Rgba<u8>) -> String {
    if c[3] == 255 {
        format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3])
    }
}
