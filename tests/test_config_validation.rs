mod common;

use std::sync::Arc;
use std::time::Duration;

use common::config_file;
use specimen::config::{ConfigLimits, ConfigLoader, LoaderOptions};
use specimen::error::ConfigError;
use specimen::interaction::InteractionKind;
use specimen::lifecycle::{DecayEngine, Stage};
use specimen::render::{StyleSheet, StyleSink};
use specimen::subscribers::Atmosphere;

const CUSTOM: &str = r"
timings:
  standard:
    healthy: 1000
    panic: 500
    decay: 500
    death: 400
    total: 2400
  pirate:
    fadeOutDuration: 200
    colorShiftDuration: 600
colors:
  panic:
    core: { r: 255, g: 0, b: 0 }
interaction:
  resetEvents: [click, key-down]
  throttleMs: 50
";

#[test]
fn custom_file_loads_and_freezes() {
    let file = config_file(CUSTOM);
    let loaded = ConfigLoader::with_defaults().load(file.path()).unwrap();
    let config = &loaded.config;

    assert!(loaded.warnings.is_empty());
    assert_eq!(config.timings.standard.lifespan_ms(), 2_400);
    assert_eq!(config.timings.pirate.color_shift(), Duration::from_millis(600));
    assert_eq!(
        config.interaction.reset_events,
        vec![InteractionKind::Click, InteractionKind::KeyDown]
    );
    assert_eq!(config.colors.get(Stage::Panic).core.r, 255);
}

#[test]
fn every_issue_is_reported_at_once() {
    let file = config_file(
        "timings:\n  standard:\n    total: 1\n    opacityMultiplier: -1\nvignette:\n  decay:\n    opacity: 3\n",
    );
    let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
    let ConfigError::ValidationError { errors, .. } = err else {
        panic!("expected validation error, got {err}");
    };
    let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"timings.standard.total"));
    assert!(paths.contains(&"timings.standard.opacityMultiplier"));
    assert!(paths.contains(&"vignette.decay.opacity"));
}

#[test]
fn malformed_yaml_is_parse_error() {
    let file = config_file("timings: [unclosed");
    let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn oversized_file_is_rejected() {
    let file = config_file(&format!("# {}\n", "x".repeat(4_096)));
    let loader = ConfigLoader::new(LoaderOptions {
        config_limits: ConfigLimits {
            max_config_size: 1_024,
        },
        ..LoaderOptions::default()
    });
    let err = loader.load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::TooLarge { .. }));
}

#[test]
fn time_scale_applies_after_validation() {
    let file = config_file(CUSTOM);
    let loader = ConfigLoader::new(LoaderOptions {
        time_scale: 2.0,
        ..LoaderOptions::default()
    });
    let config = loader.load(file.path()).unwrap().config;
    assert_eq!(config.timings.standard.total, 4_800);
    assert_eq!(config.timings.pirate.fade_out_duration, 400);
}

#[tokio::test(start_paused = true)]
async fn loaded_config_drives_engine_and_atmosphere() {
    let file = config_file(CUSTOM);
    let config = ConfigLoader::with_defaults().load(file.path()).unwrap().config;

    let sheet = Arc::new(StyleSheet::new());
    let sink: Arc<dyn StyleSink> = sheet.clone();
    let engine = DecayEngine::new(config.timings.clone());
    engine.subscribe(Atmosphere::new(Arc::clone(&config), sink));
    engine.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    assert_eq!(engine.stage(), Stage::Panic);
    assert_eq!(sheet.property("--core-r").as_deref(), Some("255"));

    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert!(engine.is_dead());
}
