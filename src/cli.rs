// ============================================================================
// qa-annotate CLI: headless batch annotation via command-line arguments
// ============================================================================
//
// Usage examples:
//   qa-annotate --input shot.png --script marks.txt --output evidence.png
//   qa-annotate -i "shots/*.png" --script marks.txt --output-dir annotated/
//   qa-annotate -i shot.jpg --container 800x600 --dpr 2 -o out.png
//   qa-annotate -i shot.png -s marks.txt --upload project-42
//
// Each input gets its own annotation session. The command file is parsed
// once, up front, and replayed against every image.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::error::Result;
use crate::io::{self, ContainerSize, ImageSource};
use crate::ops::script::{Command, parse_script, run_script};
use crate::ops::text::load_system_font;
use crate::session::AnnotationSession;
use crate::settings::AnnotateSettings;
use crate::upload::{DirectoryUploader, EvidenceUploader};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Annotate QA screenshots without a browser.
#[derive(Parser, Debug)]
#[command(
    name = "qa-annotate",
    about = "Headless screenshot annotation for QA evidence",
    long_about = "Replay an annotation command file (strokes, shapes, arrows, text,\n\
                  undo/redo) over one or more screenshots and export lossless PNGs.\n\n\
                  Example:\n  \
                  qa-annotate --input shot.png --script marks.txt --output evidence.png\n  \
                  qa-annotate -i \"shots/*.png\" -s marks.txt --output-dir annotated/"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Annotation command file replayed on each input.
    /// If omitted, images are only fitted and re-exported.
    #[arg(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Output PNG path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Available drawing area, e.g. 800x600. Images are shrunk to fit, never enlarged.
    #[arg(long, value_name = "WxH", value_parser = parse_container)]
    pub container: Option<ContainerSize>,

    /// Device pixel ratio of the backing buffer (overrides the settings file).
    #[arg(long, value_name = "RATIO")]
    pub dpr: Option<f32>,

    /// Also store each export as evidence under this folder of the upload directory.
    #[arg(long, value_name = "FOLDER")]
    pub upload: Option<String>,

    /// Print script console output and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_container(s: &str) -> std::result::Result<ContainerSize, String> {
    ContainerSize::parse(s).ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo(args.verbose);
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let mut settings = AnnotateSettings::load_or_init();
    if let Some(dpr) = args.dpr {
        settings.device_pixel_ratio = dpr;
    }

    let commands = match &args.script {
        Some(path) => match load_commands(path) {
            Ok(cmds) => cmds,
            Err(e) => {
                eprintln!("error: {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let uploader = args.upload.as_ref().map(|_| {
        let root = if settings.upload_dir.is_empty() {
            args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
        } else {
            PathBuf::from(&settings.upload_dir)
        };
        DirectoryUploader::new(root)
    });

    let needs_font = commands.iter().any(|c| matches!(c, Command::Text { .. }));
    let font = if needs_font { load_system_font(&settings.font_family) } else { None };
    if needs_font && font.is_none() {
        crate::log_warn!("No system font found for '{}'", settings.font_family);
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let mut session = AnnotationSession::new(settings.session_options()).with_font(font.clone());
        let result = run_one(&mut session, input_path, &output_path, &commands, args.container, args.verbose)
            .and_then(|blob| match (&uploader, &args.upload) {
                (Some(uploader), Some(folder)) => uploader.upload(folder, &blob).map(Some),
                _ => Ok(None),
            });
        session.close();

        match result {
            Ok(url) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                if let Some(url) = url {
                    println!("  uploaded: {}", url);
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn load_commands(path: &Path) -> Result<Vec<Command>> {
    let source = std::fs::read_to_string(path)?;
    parse_script(&source)
}

fn run_one(
    session:   &mut AnnotationSession,
    input:     &Path,
    output:    &Path,
    commands:  &[Command],
    container: Option<ContainerSize>,
    verbose:   bool,
) -> Result<io::Blob> {
    session.load(&ImageSource::Path(input.to_path_buf()), container)?;

    if !commands.is_empty() {
        let console = run_script(session, commands)?;
        if verbose {
            for line in &console {
                println!("  [script] {}", line);
            }
        }
    }

    let blob = session.export_image()?;
    io::write_blob(&blob, output)?;
    Ok(blob)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, single-file input)
/// 2. `--output-dir` (batch directory, `<stem>.png`)
/// 3. Fallback: next to the input as `<stem>_annotated.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_annotated.png", stem)))
}
