//! Configuration validation.
//!
//! Loads every file through the regular loader and reports its issues.
//! All files are checked; the first failure becomes the exit status.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::ConfigLoader;
use crate::error::{ConfigError, Severity, SpecimenError, ValidationIssue};

/// Outcome for one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

/// Validates configuration files.
///
/// # Errors
///
/// Returns an I/O error for a missing file, or the first file's
/// configuration error. With `--strict`, warnings fail the file.
pub fn run(args: &ValidateArgs) -> Result<(), SpecimenError> {
    let loader = ConfigLoader::with_defaults();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<SpecimenError> = None;

    for path in &args.files {
        let (report, error) = check(&loader, path, args.strict);
        match args.format {
            OutputFormat::Human => print_human(&report),
            OutputFormat::Json => reports.push(report),
        }
        if first_error.is_none() {
            first_error = error;
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    first_error.map_or(Ok(()), Err)
}

fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> (FileReport, Option<SpecimenError>) {
    let file = path.display().to_string();

    if !path.exists() {
        let message = format!("file not found: {file}");
        let report = FileReport {
            file,
            valid: false,
            errors: vec![message.clone()],
            warnings: Vec::new(),
        };
        let error = std::io::Error::new(std::io::ErrorKind::NotFound, message);
        return (report, Some(SpecimenError::Io(error)));
    }
    tracing::info!(%file, "validating configuration");

    match loader.load(path) {
        Ok(loaded) => {
            let warnings: Vec<String> = loaded.warnings.iter().map(ToString::to_string).collect();
            if strict && !warnings.is_empty() {
                let issues = loaded
                    .warnings
                    .into_iter()
                    .map(|w| ValidationIssue {
                        path: w.location.unwrap_or_default(),
                        message: w.message,
                        severity: Severity::Warning,
                    })
                    .collect();
                let report = FileReport {
                    file: file.clone(),
                    valid: false,
                    errors: Vec::new(),
                    warnings,
                };
                let error = ConfigError::ValidationError {
                    path: file,
                    errors: issues,
                };
                return (report, Some(error.into()));
            }
            tracing::info!(%file, "configuration valid");
            let report = FileReport {
                file,
                valid: true,
                errors: Vec::new(),
                warnings,
            };
            (report, None)
        }
        Err(e) => {
            let errors = match &e {
                ConfigError::ValidationError { errors, .. } => {
                    errors.iter().map(ToString::to_string).collect()
                }
                other => vec![other.to_string()],
            };
            let report = FileReport {
                file,
                valid: false,
                errors,
                warnings: Vec::new(),
            };
            (report, Some(e.into()))
        }
    }
}

fn print_human(report: &FileReport) {
    if report.valid {
        println!("ok    {}", report.file);
    } else {
        println!("FAIL  {}", report.file);
    }
    for issue in report.errors.iter().chain(&report.warnings) {
        eprintln!("  {issue}");
    }
}
