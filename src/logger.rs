//! Run log for annotation sessions and the batch CLI.
//!
//! One file per run, truncated when the run starts, under the OS data
//! directory (`qa-annotate/qa-annotate.log`; `XDG_DATA_HOME` respected).
//! `QA_ANNOTATE_LOG` overrides the location.
//!
//! Library code logs through `log_info!` / `log_warn!` / `log_err!`. The
//! macros expand to a single expression, so they work as statements and as
//! closure bodies (`.inspect_err(|e| log_err!("{}", e))`). Until [`init`] or
//! [`init_at`] runs, lines are dropped.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
/// Mirror warnings and errors to stderr (`--verbose`).
static ECHO: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

pub fn set_echo(enabled: bool) {
    ECHO.store(enabled, Ordering::Relaxed);
}

/// `[HH:MM:SS] [LEVEL] message`
pub fn format_line(clock: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock, level.tag(), msg)
}

fn append(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: Level, msg: &str) {
    let line = format_line(&clock(), level, msg);
    if level >= Level::Warn && ECHO.load(Ordering::Relaxed) {
        eprintln!("{}", line);
    }
    append(&line);
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open the run log at its default location. Failure to open is reported on
/// stderr and otherwise ignored.
pub fn init() {
    let path = std::env::var_os("QA_ANNOTATE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(default_log_path);
    if let Err(e) = init_at(&path) {
        eprintln!("[logger] cannot open {}: {}", path.display(), e);
    }
}

/// Open (truncating) the run log at `path` and hook panics into it.
/// Only the first successful call in a process takes effect.
pub fn init_at(path: &Path) -> std::io::Result<()> {
    if LOG_FILE.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    if LOG_FILE.set(Mutex::new(file)).is_err() {
        return Ok(());
    }
    let _ = LOG_PATH.set(path.to_path_buf());

    append(&format!("=== qa-annotate {} run at unix {} ===", env!("CARGO_PKG_VERSION"), unix_secs()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        append(&format_line(&clock(), Level::Error, &format!("panic: {}", info)));
        prev(info);
    }));
    Ok(())
}

fn default_log_path() -> PathBuf {
    data_dir().join("qa-annotate").join("qa-annotate.log")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share"),
        Err(_) => PathBuf::from("."),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// UTC wall clock within the day.
fn clock() -> String {
    let secs = unix_secs();
    format!("{:02}:{:02}:{:02}", (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60)
}
