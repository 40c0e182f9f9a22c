// ============================================================================
// Annotation command files: a line-based batch language over a session
// ============================================================================
//
//   # mark the broken button
//   tool rectangle
//   color #ef4444
//   width 4
//   stroke 40,40 220,90
//   tool text
//   text Broken here @40,120
//   undo
//
// Coordinates are logical pixels. Every line is parsed before anything is
// applied, so a typo never leaves an image half-annotated.

use image::Rgba;

use crate::components::tools::{Tool, parse_color};
use crate::error::{AnnotateError, Result};
use crate::session::{AnnotationSession, PLACEHOLDER_ANCHOR, PLACEHOLDER_TEXT};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Tool(Tool),
    Color(Rgba<u8>),
    Width(u32),
    /// Press at the first point, drag through the rest, release.
    Stroke(Vec<(f32, f32)>),
    Text { text: Option<String>, anchor: Option<(f32, f32)> },
    Undo,
    Redo,
    Clear,
}

fn script_err(line: usize, message: impl Into<String>) -> AnnotateError {
    AnnotateError::Script { line, message: message.into() }
}

fn parse_point(s: &str) -> Option<(f32, f32)> {
    let (x, y) = s.split_once(',')?;
    let x: f32 = x.trim().parse().ok()?;
    let y: f32 = y.trim().parse().ok()?;
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

fn parse_text(rest: &str, line: usize) -> Result<Command> {
    let mut body = rest.trim();
    let mut anchor = None;
    if let Some(idx) = body.rfind('@')
        && !body[idx + 1..].contains(char::is_whitespace)
    {
        let point = parse_point(&body[idx + 1..])
            .ok_or_else(|| script_err(line, format!("bad text anchor '{}'", &body[idx..])))?;
        anchor = Some(point);
        body = body[..idx].trim_end();
    }
    let text = (!body.is_empty()).then(|| body.replace("\\n", "\n"));
    Ok(Command::Text { text, anchor })
}

/// Parse a whole command file. Line numbers in errors are 1-based.
pub fn parse_script(source: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (word, rest) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
        let rest = rest.trim();
        let command = match word.to_ascii_lowercase().as_str() {
            "tool" => Tool::from_name(rest)
                .map(Command::Tool)
                .ok_or_else(|| script_err(line, format!("unknown tool '{}'", rest)))?,
            "color" => Command::Color(parse_color(rest).map_err(|e| script_err(line, e.to_string()))?),
            "width" => Command::Width(
                rest.parse()
                    .map_err(|_| script_err(line, format!("bad width '{}'", rest)))?,
            ),
            "stroke" => {
                let points = rest
                    .split_whitespace()
                    .map(|p| parse_point(p).ok_or_else(|| script_err(line, format!("bad point '{}'", p))))
                    .collect::<Result<Vec<_>>>()?;
                if points.is_empty() {
                    return Err(script_err(line, "stroke needs at least one point"));
                }
                Command::Stroke(points)
            }
            "text" => parse_text(rest, line)?,
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            "clear" => Command::Clear,
            other => return Err(script_err(line, format!("unknown command '{}'", other))),
        };
        commands.push(command);
    }
    Ok(commands)
}

/// Replay parsed commands against a loaded session. Returns console lines
/// describing what happened, for `--verbose`.
pub fn run_script(session: &mut AnnotationSession, commands: &[Command]) -> Result<Vec<String>> {
    let mut console = Vec::new();
    for command in commands {
        match command {
            Command::Tool(tool) => session.set_tool(*tool),
            Command::Color(color) => session.set_color(*color),
            Command::Width(width) => session.set_stroke_width(*width),
            Command::Stroke(points) => {
                let Some((&(x, y), rest)) = points.split_first() else { continue };
                session.begin_stroke(x, y);
                for &(x, y) in rest {
                    session.extend_stroke(x, y);
                }
                if !session.end_stroke()? {
                    console.push(format!("{} stroke left the image unchanged", session.tool().name()));
                }
            }
            Command::Text { text, anchor } => {
                let text = text.as_deref().unwrap_or(PLACEHOLDER_TEXT);
                session.add_text_at(text, anchor.unwrap_or(PLACEHOLDER_ANCHOR))?;
            }
            Command::Undo => {
                if !session.undo() {
                    console.push("undo: already at the original image".to_string());
                }
            }
            Command::Redo => {
                if !session.redo() {
                    console.push("redo: nothing to redo".to_string());
                }
            }
            Command::Clear => session.clear(),
        }
    }
    console.push(format!(
        "{} annotation step(s), {} undone",
        session.history().undo_count(),
        session.history().redo_count()
    ));
    Ok(console)
}
