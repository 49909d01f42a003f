//! Error types for `specimen`.
//!
//! Domain errors per concern, aggregated by [`SpecimenError`] which maps each
//! failure onto a process exit code.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `specimen` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Audio synthesis or WAV output error
    pub const AUDIO_ERROR: i32 = 4;

    /// Decay engine error (transition refused, no runtime)
    pub const ENGINE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `specimen` operations.
#[derive(Debug, Error)]
pub enum SpecimenError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Decay engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Audio synthesis error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Invalid command-line usage that clap could not catch
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SpecimenError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Engine(_) => ExitCode::ENGINE_ERROR,
            Self::Audio(_) => ExitCode::AUDIO_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("{path} is {size} bytes (limit: {limit})")]
    TooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "timings.standard.total")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Decay engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is dead; only `start()` leaves that state
    #[error("decay engine is dead; restart it before requesting a transition")]
    Dead,

    /// A scheduling operation ran outside a Tokio runtime
    #[error("decay engine requires a Tokio runtime")]
    NoRuntime,
}

// ============================================================================
// Audio Errors
// ============================================================================

/// Audio synthesis and output errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The synthesis context could not be created
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// Writing the rendered audio failed
    #[error("WAV output failed: {0}")]
    Wav(#[from] hound::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `specimen` operations.
pub type Result<T> = std::result::Result<T, SpecimenError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::AUDIO_ERROR, 4);
        assert_eq!(ExitCode::ENGINE_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_engine_error_exit_code() {
        let err: SpecimenError = EngineError::Dead.into();
        assert_eq!(err.exit_code(), ExitCode::ENGINE_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: SpecimenError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_audio_error_exit_code() {
        let err: SpecimenError = AudioError::ContextUnavailable("no device".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::AUDIO_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: SpecimenError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = SpecimenError::Usage("bad flag".to_string());
        assert_eq!(err.exit_code(), ExitCode::USAGE_ERROR);
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "timings.standard.total".to_string(),
            message: "total must equal the stage sum".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: total must equal the stage sum at timings.standard.total"
        );
    }

    #[test]
    fn test_too_large_display() {
        let err = ConfigError::TooLarge {
            path: PathBuf::from("big.yaml"),
            size: 20,
            limit: 10,
        };
        assert_eq!(err.to_string(), "big.yaml is 20 bytes (limit: 10)");
    }
}
