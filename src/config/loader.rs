//! Configuration loader.
//!
//! Loading runs in stages:
//! 1. Size check against [`ConfigLimits`]
//! 2. Read, strip a UTF-8 BOM
//! 3. YAML parsing into [`SpecimenConfig`]
//! 4. Validation (errors abort, warnings are returned)
//! 5. Optional time scaling
//! 6. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::schema::SpecimenConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Limits for configuration size.
    pub config_limits: ConfigLimits,

    /// Multiplier applied to every duration after validation.
    pub time_scale: f64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            config_limits: ConfigLimits::default(),
            time_scale: 1.0,
        }
    }
}

/// Limits for configuration size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum configuration file size in bytes.
    pub max_config_size: u64,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("SPECIMEN_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<SpecimenConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {}", self.message, location),
            None => f.write_str(&self.message),
        }
    }
}

/// Configuration loader.
///
/// Handles the full loading pipeline from YAML file to frozen
/// [`SpecimenConfig`].
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a new configuration loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - YAML parsing fails
    /// - Validation reports errors
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let limit = self.options.config_limits.max_config_size;
        if metadata.len() > limit {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        debug!(path = %path.display(), bytes = raw.len(), "loading configuration");

        self.load_str(&raw, path)
    }

    /// Loads configuration from YAML text. `origin` names the source in
    /// error messages.
    ///
    /// An empty document yields the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if YAML parsing fails or validation reports errors.
    pub fn load_str(&self, yaml: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let yaml = yaml.strip_prefix('\u{feff}').unwrap_or(yaml);

        let config: SpecimenConfig = if yaml.trim().is_empty() {
            SpecimenConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        self.finish(config, &origin.display().to_string())
    }

    /// Validates, scales and freezes an in-memory configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation reports errors.
    pub fn finish(&self, mut config: SpecimenConfig, origin: &str) -> Result<LoadResult, ConfigError> {
        let result = Validator::new().validate(&config);

        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.to_string(),
                errors: result.errors,
            });
        }

        let warnings: Vec<LoadWarning> = result
            .warnings
            .into_iter()
            .map(|issue| LoadWarning {
                message: issue.message,
                location: Some(issue.path),
            })
            .collect();
        for warning in &warnings {
            warn!(%origin, "{warning}");
        }

        #[allow(clippy::float_cmp)]
        if self.options.time_scale != 1.0 {
            config.timings = config.timings.scaled(self.options.time_scale);
            debug!(scale = self.options.time_scale, "timings scaled");
        }

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }

    /// Loads `path` if given, otherwise validates the built-in defaults.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_or_default(&self, path: Option<&Path>) -> Result<LoadResult, ConfigError> {
        match path {
            Some(path) => self.load(path),
            None => self.finish(SpecimenConfig::default(), "<built-in>"),
        }
    }
}

/// Default configuration file name looked up by the CLI.
#[must_use]
pub fn default_config_path() -> PathBuf {
    PathBuf::from("specimen.yaml")
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config("timings:\n  standard:\n    healthy: 1000\n    total: 9000\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.config.timings.standard.healthy, 1_000);
        assert_eq!(result.config.timings.standard.total, 9_000);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(*result.config, SpecimenConfig::default());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_bom_is_stripped() {
        let file = write_config("\u{feff}interaction:\n  throttleMs: 250\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.config.interaction.throttle_ms, 250);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::with_defaults()
            .load(Path::new("/nonexistent/specimen.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_size_limit() {
        let file = write_config("timings: {}\n");
        let loader = ConfigLoader::new(LoaderOptions {
            config_limits: ConfigLimits { max_config_size: 4 },
            ..LoaderOptions::default()
        });
        let err = loader.load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge { limit: 4, .. }));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let file = write_config("timings:\n  standard:\n    healthy: [oops\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        match err {
            ConfigError::ParseError { line, .. } => assert!(line.is_some()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_error_aborts() {
        let file = write_config("timings:\n  standard:\n    total: 1\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert!(errors.iter().any(|e| e.path == "timings.standard.total"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_warnings_are_returned() {
        let file = write_config("interaction:\n  throttleMs: 0\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.location.as_deref() == Some("interaction.throttleMs"))
        );
    }

    #[test]
    fn test_time_scale_applied_after_validation() {
        let loader = ConfigLoader::new(LoaderOptions {
            time_scale: 0.5,
            ..LoaderOptions::default()
        });
        let result = loader.load_or_default(None).unwrap();
        assert_eq!(result.config.timings.standard.healthy, 12_000);
        assert_eq!(result.config.timings.standard.total, 16_000);
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("SPECIMEN_TEST_UNSET_LIMIT_XYZ", 7_u64), 7);
    }
}
