//! Shared integration-test helpers: spawning the `specimen` binary, writing
//! configuration fixtures and wiring a full subscriber stack.

#![allow(dead_code)]

use std::io::Write;
use std::process::{Command, Output};
use std::sync::Arc;

use specimen::config::{SpecimenConfig, Timings};
use specimen::lifecycle::DecayEngine;
use specimen::render::{StyleSheet, StyleSink, Viewport};
use specimen::subscribers::{Atmosphere, AudioEngine, AudioOptions, BeamScanner, ParticleField};

/// Runs `specimen` with `args` to completion and returns its output.
#[allow(clippy::missing_panics_doc)]
pub fn spawn_command(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_specimen"))
        .args(args)
        .env_remove("SPECIMEN_CONFIG")
        .env_remove("SPECIMEN_LOG_LEVEL")
        .env_remove("SPECIMEN_LOG_FORMAT")
        .env_remove("SPECIMEN_EVENTS_FILE")
        .env_remove("SPECIMEN_METRICS_PORT")
        .output()
        .expect("failed to spawn specimen")
}

/// Writes `yaml` to a temporary `.yaml` file that lives as long as the
/// returned handle.
#[allow(clippy::missing_panics_doc)]
pub fn config_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("failed to create temp config");
    file.write_all(yaml.as_bytes()).expect("failed to write temp config");
    file
}

/// Default timings sped up tenfold: a 3.2 s lifespan, 200 ms death,
/// 700 ms pirate colour shift and 300 ms pirate fade-out.
pub fn fast_timings() -> Timings {
    Timings::default().scaled(0.1)
}

/// An engine with every subscriber attached to one style sheet.
pub struct Stack {
    pub engine: DecayEngine,
    pub sheet: Arc<StyleSheet>,
    pub beam: BeamScanner,
    pub particles: ParticleField,
    pub audio: AudioEngine,
}

impl Stack {
    /// Builds the stack around `engine`. Audio runs on a manual clock at
    /// 8 kHz and is initialized at full volume.
    #[allow(clippy::missing_panics_doc)]
    pub fn new(engine: DecayEngine) -> Self {
        let sheet = Arc::new(StyleSheet::new());
        let sink: Arc<dyn StyleSink> = sheet.clone();
        let config = Arc::new(SpecimenConfig {
            timings: engine.timings().clone(),
            ..SpecimenConfig::default()
        });

        let audio = AudioEngine::new(
            Arc::clone(&sink),
            AudioOptions {
                seed: Some(5),
                ..AudioOptions::offline(8_000)
            },
        );
        assert!(audio.init(), "offline audio must initialize");
        audio.set_volume_level(3);

        let beam = BeamScanner::with_phase(Arc::clone(&sink), 0.1, 0.3)
            .with_observer(Arc::new(audio.clone()));
        let particles = ParticleField::seeded(Arc::clone(&sink), &Viewport::desktop(), 9);

        engine.subscribe(Atmosphere::new(config, Arc::clone(&sink)));
        engine.subscribe(beam.clone());
        engine.subscribe(particles.clone());
        engine.subscribe(audio.clone());

        Self {
            engine,
            sheet,
            beam,
            particles,
            audio,
        }
    }
}
