//! Configuration validation.
//!
//! Validation runs on the deserialized [`SpecimenConfig`] and collects every
//! issue rather than stopping at the first, so a user sees the full list in
//! one pass.

use std::collections::HashSet;

use crate::config::schema::SpecimenConfig;
use crate::error::{Severity, ValidationIssue};
use crate::lifecycle::{Stage, StageTable};

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns the result.
    pub fn validate(&mut self, config: &SpecimenConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_standard_timings(config);
        self.validate_pirate_timings(config);
        self.validate_visual_tables(config);
        self.validate_interaction(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Timings
    // ========================================================================

    fn validate_standard_timings(&mut self, config: &SpecimenConfig) {
        let standard = &config.timings.standard;

        let sum = standard.lifespan_ms();
        if standard.total != sum {
            self.add_error(
                "timings.standard.total",
                format!(
                    "total is {} ms but the stage durations sum to {sum} ms",
                    standard.total
                ),
            );
        }

        for stage in [Stage::Healthy, Stage::Panic, Stage::Decay, Stage::Death] {
            if standard.stage_ms(stage) == Some(0) {
                self.add_warning(
                    format!("timings.standard.{stage}"),
                    format!("{stage} lasts 0 ms and will be skipped"),
                );
            }
        }

        if sum == 0 {
            self.add_warning(
                "timings.standard",
                "every stage is 0 ms; the specimen dies on its first tick",
            );
        }

        self.check_multiplier("timings.standard.opacityMultiplier", standard.opacity_multiplier);
    }

    fn validate_pirate_timings(&mut self, config: &SpecimenConfig) {
        let pirate = &config.timings.pirate;

        if pirate.color_shift_duration == 0 {
            self.add_warning(
                "timings.pirate.colorShiftDuration",
                "colour shift is 0 ms; the pirate ending completes instantly",
            );
        }

        if pirate.fade_out_duration > pirate.color_shift_duration {
            self.add_warning(
                "timings.pirate.fadeOutDuration",
                format!(
                    "fade-out ({} ms) outlasts the colour shift ({} ms); the callback fires after death",
                    pirate.fade_out_duration, pirate.color_shift_duration
                ),
            );
        }

        self.check_multiplier("timings.pirate.opacityMultiplier", pirate.opacity_multiplier);
    }

    fn check_multiplier(&mut self, path: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.add_error(path, format!("multiplier must be a non-negative number, got {value}"));
        }
    }

    // ========================================================================
    // Visual tables
    // ========================================================================

    fn validate_visual_tables(&mut self, config: &SpecimenConfig) {
        self.each_stage("colors", &config.colors, |v, c| {
            v.check_unit("textOpacity", c.text_opacity);
        });
        self.each_stage("breathing", &config.breathing, |v, b| {
            v.check_unit("opacityMin", b.opacity_min);
            v.check_unit("opacityMax", b.opacity_max);
            v.check_non_negative("speed", b.speed);
            if b.opacity_min > b.opacity_max {
                v.push_error("opacityMin", "opacityMin is greater than opacityMax".to_string());
            }
        });
        self.each_stage("vignette", &config.vignette, |v, g| {
            v.check_unit("opacity", g.opacity);
            v.check_non_negative("radius", g.radius);
        });
        self.each_stage("scanlines", &config.scanlines, |v, s| {
            v.check_unit("opacity", s.opacity);
            v.check_non_negative("speed", s.speed);
        });
        self.each_stage("blur", &config.blur, |v, b| {
            v.check_non_negative("title", b.title);
            v.check_non_negative("text", b.text);
            v.check_non_negative("pirate", b.pirate);
        });
        self.each_stage("textShadow", &config.text_shadow, |v, t| {
            v.check_unit("intensity", t.intensity);
            v.check_non_negative("spread", t.spread);
        });
        self.each_stage("flicker", &config.flicker, |v, f| {
            v.check_non_negative("speed", f.speed);
            v.check_non_negative("brightness", f.brightness);
        });
    }

    fn each_stage<T>(
        &mut self,
        table_name: &str,
        table: &StageTable<T>,
        mut check: impl FnMut(&mut StageCheck<'_>, &T),
    ) {
        for (stage, value) in table.iter() {
            let mut scope = StageCheck {
                validator: &mut *self,
                prefix: format!("{table_name}.{stage}"),
            };
            check(&mut scope, value);
        }
    }

    // ========================================================================
    // Interaction
    // ========================================================================

    fn validate_interaction(&mut self, config: &SpecimenConfig) {
        let interaction = &config.interaction;

        if interaction.reset_events.is_empty() {
            self.add_warning(
                "interaction.resetEvents",
                "no reset events configured; user activity never rebases the clock",
            );
        }

        let mut seen = HashSet::new();
        for kind in &interaction.reset_events {
            if !seen.insert(*kind) {
                self.add_warning(
                    "interaction.resetEvents",
                    format!("'{kind}' is listed more than once"),
                );
            }
        }

        if interaction.throttle_ms == 0 {
            self.add_warning(
                "interaction.throttleMs",
                "throttle is 0 ms; every event resets the clock",
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}

/// Field checks scoped to one stage of one table.
struct StageCheck<'a> {
    validator: &'a mut Validator,
    prefix: String,
}

impl StageCheck<'_> {
    fn push_error(&mut self, field: &str, message: String) {
        let path = format!("{}.{field}", self.prefix);
        self.validator.add_error(path, message);
    }

    fn check_unit(&mut self, field: &str, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            self.push_error(field, format!("must be within [0, 1], got {value}"));
        }
    }

    fn check_non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.push_error(field, format!("must be a non-negative number, got {value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::InteractionConfig;

    fn validate(config: &SpecimenConfig) -> ValidationResult {
        Validator::new().validate(config)
    }

    fn paths(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_defaults_are_clean() {
        let result = validate(&SpecimenConfig::default());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_total_mismatch_is_an_error() {
        let mut config = SpecimenConfig::default();
        config.timings.standard.total = 30_000;
        let result = validate(&config);
        assert!(result.has_errors());
        assert_eq!(paths(&result.errors), vec!["timings.standard.total"]);
        assert!(result.errors[0].message.contains("32000"));
    }

    #[test]
    fn test_zero_stage_is_a_warning() {
        let mut config = SpecimenConfig::default();
        config.timings.standard.panic = 0;
        config.timings.standard.total = 29_000;
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(paths(&result.warnings), vec!["timings.standard.panic"]);
    }

    #[test]
    fn test_fade_out_longer_than_shift_warns() {
        let mut config = SpecimenConfig::default();
        config.timings.pirate.fade_out_duration = 9_000;
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(paths(&result.warnings), vec!["timings.pirate.fadeOutDuration"]);
    }

    #[test]
    fn test_opacity_out_of_range_is_an_error() {
        let mut config = SpecimenConfig::default();
        config.colors.decay.text_opacity = 1.5;
        config.vignette.death.opacity = -0.1;
        let result = validate(&config);
        assert_eq!(
            paths(&result.errors),
            vec!["colors.decay.textOpacity", "vignette.death.opacity"]
        );
    }

    #[test]
    fn test_breathing_bounds_inverted() {
        let mut config = SpecimenConfig::default();
        config.breathing.panic.opacity_min = 0.9;
        config.breathing.panic.opacity_max = 0.4;
        let result = validate(&config);
        assert_eq!(paths(&result.errors), vec!["breathing.panic.opacityMin"]);
    }

    #[test]
    fn test_negative_blur_is_an_error() {
        let mut config = SpecimenConfig::default();
        config.blur.healthy.title = -1.0;
        let result = validate(&config);
        assert_eq!(paths(&result.errors), vec!["blur.healthy.title"]);
    }

    #[test]
    fn test_interaction_warnings() {
        let config = SpecimenConfig {
            interaction: InteractionConfig {
                reset_events: Vec::new(),
                throttle_ms: 0,
            },
            ..SpecimenConfig::default()
        };
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(
            paths(&result.warnings),
            vec!["interaction.resetEvents", "interaction.throttleMs"]
        );
    }

    #[test]
    fn test_nan_multiplier_is_an_error() {
        let mut config = SpecimenConfig::default();
        config.timings.pirate.opacity_multiplier = f64::NAN;
        let result = validate(&config);
        assert_eq!(paths(&result.errors), vec!["timings.pirate.opacityMultiplier"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SpecimenConfig::default();
        config.timings.standard.total = 1;
        config.scanlines.healthy.opacity = 2.0;
        config.text_shadow.pirate.intensity = 3.0;
        let result = validate(&config);
        assert_eq!(result.errors.len(), 3);
    }
}
