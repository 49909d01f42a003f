//! Configuration module.
//!
//! Loads and validates specimen configuration files: lifecycle timings,
//! per-stage visual tables and the interaction reset policy.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions, default_config_path};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
