//! FFmpeg console verbosity.
//!
//! FFmpeg writes its own diagnostics straight to stderr, independent of the
//! `log` facade used by the rest of the crate. While frames are extracted
//! from a [`MediaSource`](crate::MediaSource) that output interleaves with
//! progress bars, so callers usually want it quieter than FFmpeg's default.
//!
//! ```no_run
//! use frameflow::FfmpegLogLevel;
//!
//! frameflow::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::FrameFlowError;

/// FFmpeg log verbosity, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfmpegLogLevel {
    /// Nothing at all.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings; FFmpeg's default.
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging output.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    const NAMES: [(&'static str, FfmpegLogLevel); 9] = [
        ("quiet", FfmpegLogLevel::Quiet),
        ("panic", FfmpegLogLevel::Panic),
        ("fatal", FfmpegLogLevel::Fatal),
        ("error", FfmpegLogLevel::Error),
        ("warning", FfmpegLogLevel::Warning),
        ("info", FfmpegLogLevel::Info),
        ("verbose", FfmpegLogLevel::Verbose),
        ("debug", FfmpegLogLevel::Debug),
        ("trace", FfmpegLogLevel::Trace),
    ];

    /// Lower-case name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, level)| *level == self)
            .map_or("warning", |(name, _)| name)
    }

    fn as_ffmpeg(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = FrameFlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        let wanted = if wanted == "warn" { "warning" } else { wanted.as_str() };
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, level)| *level)
            .ok_or_else(|| FrameFlowError::InvalidSettings(format!("unknown log level '{value}'")))
    }
}

/// Set how much FFmpeg prints to stderr. Does not touch `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    log::debug!("FFmpeg log level set to {level}");
    ffmpeg_next::util::log::set_level(level.as_ffmpeg());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("ERROR".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Error);
        assert_eq!("warn".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!(" quiet ".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn display_round_trips_every_level() {
        for (name, level) in FfmpegLogLevel::NAMES {
            assert_eq!(level.to_string(), name);
            assert_eq!(name.parse::<FfmpegLogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn levels_order_from_quiet_to_trace() {
        assert!(FfmpegLogLevel::Quiet < FfmpegLogLevel::Error);
        assert!(FfmpegLogLevel::Error < FfmpegLogLevel::Trace);
    }
}
