//! CLI argument definitions.
//!
//! All Clap derive structs for `specimen` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::interaction::InteractionKind;
use crate::subscribers::audio::SAMPLE_RATE;

// ============================================================================
// Root CLI
// ============================================================================

/// Decay lifecycle engine: ages a page through healthy, panic, decay and
/// death.
#[derive(Parser, Debug)]
#[command(name = "specimen", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SPECIMEN_COLOR")]
    pub color: ColorChoice,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the lifecycle headless with every subscriber attached.
    Run(RunArgs),

    /// Print the lifecycle a configuration produces.
    Timeline(TimelineArgs),

    /// Validate configuration files.
    Validate(ValidateArgs),

    /// Render the lifecycle's audio to a WAV file.
    Render(RenderArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Run
// ============================================================================

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to YAML configuration file (built-in defaults when omitted).
    #[arg(short, long, env = "SPECIMEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Multiply every duration (0.1 runs ten times faster).
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Divert to the pirate ending after this long (e.g. `5s`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub pirate_after: Option<Duration>,

    /// Simulate an interaction this often (e.g. `2s`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interact_every: Option<Duration>,

    /// Kind of simulated interaction.
    #[arg(long, default_value = "click")]
    pub interact_kind: InteractionKind,

    /// Stop after this long even if the engine is still alive.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub max_duration: Option<Duration>,

    /// Use a mobile viewport.
    #[arg(long)]
    pub mobile: bool,

    /// Number of text lines the beam sweeps over.
    #[arg(long, default_value_t = 40)]
    pub lines: usize,

    /// Audio volume level (0 mutes).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub volume: u8,

    /// Write the JSONL event stream to this file.
    #[arg(long, env = "SPECIMEN_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on 127.0.0.1 at this port.
    #[arg(long, env = "SPECIMEN_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Print the final style sheet as JSON on exit.
    #[arg(long)]
    pub dump_styles: bool,
}

// ============================================================================
// Timeline
// ============================================================================

/// Arguments for `timeline`.
#[derive(Args, Debug)]
pub struct TimelineArgs {
    /// Path to YAML configuration file (built-in defaults when omitted).
    #[arg(short, long, env = "SPECIMEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sampling step for the bucketing table.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub step: Duration,

    /// Print the simulated event sequence instead of the bucketing table.
    #[arg(long)]
    pub simulate: bool,

    /// With `--simulate`, divert to the pirate ending after this long.
    #[arg(long, value_parser = humantime::parse_duration, requires = "simulate")]
    pub pirate_after: Option<Duration>,

    /// Multiply every duration.
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Validate
// ============================================================================

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Render
// ============================================================================

/// Arguments for `render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to YAML configuration file (built-in defaults when omitted).
    #[arg(short, long, env = "SPECIMEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// WAV file to write.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Divert to the pirate ending after this long.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub pirate_after: Option<Duration>,

    /// Multiply every duration.
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Sample rate in Hz.
    #[arg(long, default_value_t = SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Audio volume level.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub volume: u8,

    /// Silence rendered after the last lifecycle event.
    #[arg(long, default_value = "3s", value_parser = humantime::parse_duration)]
    pub tail: Duration,

    /// Use a mobile viewport for the beam.
    #[arg(long)]
    pub mobile: bool,

    /// Seed for the beam phase and click jitter.
    #[arg(long)]
    pub seed: Option<u64>,
}

// ============================================================================
// Completions / Version
// ============================================================================

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["specimen", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected RunArgs");
        };
        assert!(args.config.is_none());
        assert_eq!(args.volume, 1);
        assert_eq!(args.lines, 40);
        assert_eq!(args.interact_kind, InteractionKind::Click);
        assert!(args.pirate_after.is_none());
    }

    #[test]
    fn test_run_durations_use_humantime() {
        let cli = Cli::try_parse_from([
            "specimen",
            "run",
            "--pirate-after",
            "1500ms",
            "--interact-every",
            "2s",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected RunArgs");
        };
        assert_eq!(args.pirate_after, Some(Duration::from_millis(1500)));
        assert_eq!(args.interact_every, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_run_rejects_bad_volume() {
        assert!(Cli::try_parse_from(["specimen", "run", "--volume", "4"]).is_err());
    }

    #[test]
    fn test_run_rejects_unknown_interaction() {
        assert!(Cli::try_parse_from(["specimen", "run", "--interact-kind", "wiggle"]).is_err());
    }

    #[test]
    fn test_timeline_pirate_requires_simulate() {
        assert!(Cli::try_parse_from(["specimen", "timeline", "--pirate-after", "1s"]).is_err());
        assert!(
            Cli::try_parse_from(["specimen", "timeline", "--simulate", "--pirate-after", "1s"])
                .is_ok()
        );
    }

    #[test]
    fn test_render_requires_output() {
        assert!(Cli::try_parse_from(["specimen", "render"]).is_err());
        let cli = Cli::try_parse_from(["specimen", "render", "-o", "out.wav"]).unwrap();
        let Commands::Render(args) = cli.command else {
            panic!("Expected RenderArgs");
        };
        assert_eq!(args.sample_rate, SAMPLE_RATE);
        assert_eq!(args.tail, Duration::from_secs(3));
    }

    #[test]
    fn test_validate_requires_files() {
        assert!(Cli::try_parse_from(["specimen", "validate"]).is_err());
    }

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["specimen", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let err = Cli::try_parse_from(["specimen", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["specimen", "-vv", "--color", "never", "version"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.color, ColorChoice::Never);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
