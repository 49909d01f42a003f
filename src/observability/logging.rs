//! Logging setup.
//!
//! All diagnostics go to stderr through `tracing`, leaving stdout to the
//! command output (summaries, JSON, style sheet dumps). Verbosity raises
//! the level of this crate's own targets only; dependencies stay at `warn`.
//! `SPECIMEN_LOG_LEVEL` replaces the computed filter wholesale and
//! `SPECIMEN_LOG_FORMAT=json` switches to one JSON object per line.

use std::io::IsTerminal;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_LEVEL_ENV: &str = "SPECIMEN_LOG_LEVEL";

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "SPECIMEN_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines, coloured when stderr is a terminal.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" | "" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// How the process logs, as decided from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Output format.
    pub format: LogFormat,
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// `-q`: only errors.
    pub quiet: bool,
    /// ANSI colour policy for the human format.
    pub color: ColorChoice,
}

impl LogOptions {
    /// Builds options from the global flags, reading the format from
    /// `SPECIMEN_LOG_FORMAT`. An unknown format falls back to human output.
    #[must_use]
    pub fn new(verbosity: u8, quiet: bool, color: ColorChoice) -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        Self {
            format,
            verbosity,
            quiet,
            color,
        }
    }

    /// Filter directive used when `SPECIMEN_LOG_LEVEL` is unset.
    #[must_use]
    pub fn directive(&self) -> String {
        if self.quiet {
            return "error".to_string();
        }
        let own = match self.verbosity {
            0 => return "warn".to_string(),
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        format!("warn,specimen={own}")
    }

    fn use_ansi(&self) -> bool {
        match self.color {
            ColorChoice::Auto => {
                std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
            }
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(options: &LogOptions) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(options.directive()));
    // module paths only help once someone is debugging
    let show_target = options.verbosity >= 2;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(show_target)
        .with_writer(std::io::stderr);

    let _ = match options.format {
        LogFormat::Human => builder.with_ansi(options.use_ansi()).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(verbosity: u8, quiet: bool) -> LogOptions {
        LogOptions {
            format: LogFormat::Human,
            verbosity,
            quiet,
            color: ColorChoice::Never,
        }
    }

    #[test]
    fn verbosity_only_raises_own_targets() {
        assert_eq!(options(0, false).directive(), "warn");
        assert_eq!(options(1, false).directive(), "warn,specimen=info");
        assert_eq!(options(2, false).directive(), "warn,specimen=debug");
        assert_eq!(options(9, false).directive(), "warn,specimen=trace");
    }

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(options(3, true).directive(), "error");
    }

    #[test]
    fn format_names() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(&options(0, false));
        init_logging(&LogOptions {
            format: LogFormat::Json,
            ..options(3, false)
        });
    }
}
