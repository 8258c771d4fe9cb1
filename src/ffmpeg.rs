//! FFmpeg process-wide setup.
//!
//! FFmpeg prints its own diagnostics to stderr independently of the Rust
//! [`log`] facade. Thumbnail seeking triggers a lot of harmless warnings
//! (non-keyframe starts, missing references) so interactive front-ends
//! usually want them quieter.
//!
//! ```no_run
//! use movieprint::FfmpegLogLevel;
//!
//! movieprint::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::sync::Once;

use ffmpeg_next::util::log::Level;

use crate::error::DecodeError;

/// FFmpeg console verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    /// Parse a level name such as `"error"` or `"quiet"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "fatal" | "panic" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" | "verbose" => Some(FfmpegLogLevel::Info),
            "debug" | "trace" => Some(FfmpegLogLevel::Debug),
            _ => None,
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set FFmpeg's console verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

static INIT: Once = Once::new();

/// Initialise FFmpeg once per process.
///
/// `ffmpeg_next::init` is idempotent but not free; decode calls go through
/// this guard instead.
pub(crate) fn ensure_initialized() -> Result<(), DecodeError> {
    let mut result = Ok(());
    INIT.call_once(|| {
        if let Err(error) = ffmpeg_next::init() {
            result = Err(DecodeError::Backend(format!(
                "FFmpeg initialisation failed: {error}"
            )));
        }
    });
    result
}
