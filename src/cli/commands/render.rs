//! Offline audio render.
//!
//! Replays a simulated lifecycle through the audio subscriber on a manual
//! clock, sweeps a beam over the viewport on the collision loop's cadence,
//! and writes the captured samples to a WAV file.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::cli::args::RenderArgs;
use crate::cli::commands::load_config;
use crate::error::{AudioError, SpecimenError};
use crate::lifecycle::{Entry, Mark, Subscriber, simulate};
use crate::render::{StyleSheet, StyleSink, Viewport};
use crate::subscribers::audio::synth::peak;
use crate::subscribers::audio::write_wav;
use crate::subscribers::beam::{beam_speed, scan_interval};
use crate::subscribers::{AudioEngine, AudioOptions, BeamMotion};

/// Drives the audio engine and a beam along one timeline.
struct Renderer {
    audio: AudioEngine,
    motion: BeamMotion,
    viewport: Viewport,
    step: Duration,
    now: Duration,
}

impl Renderer {
    /// Moves the clock to `until`, sweeping the beam every step on the way.
    fn run_until(&mut self, until: Duration) {
        while self.now + self.step <= until {
            self.now += self.step;
            self.motion.advance(self.step);
            self.audio.advance_to(self.now.as_secs_f64());
            if self.motion.speed().is_some() {
                self.audio
                    .beam_sweep(self.motion.y(&self.viewport), self.viewport.height);
            }
        }
        if until > self.now {
            self.motion.advance(until - self.now);
            self.now = until;
        }
        self.audio.advance_to(self.now.as_secs_f64());
    }

    fn apply(&mut self, entry: &Entry) -> Result<(), SpecimenError> {
        match entry.mark {
            Mark::Notify { stage, progress } => {
                self.motion.set_speed(beam_speed(stage));
                let mut subscriber = self.audio.clone();
                subscriber
                    .on_stage(stage, progress)
                    .map_err(|e| AudioError::ContextUnavailable(e.to_string()))?;
            }
            Mark::PirateFadeComplete => self.audio.trigger_thinking_pulse(),
            Mark::StageEntered { stage } => debug!(%stage, at_ms = entry.at_ms, "render stage"),
            Mark::TransitionStarted { .. }
            | Mark::TransitionCompleted { .. }
            | Mark::TerminalHooks
            | Mark::Died { .. } => {}
        }
        Ok(())
    }
}

/// Renders the lifecycle's audio to a WAV file.
///
/// # Errors
///
/// Returns an error if the configuration fails to load, the synthesis
/// context cannot be opened at the requested rate, or the file cannot be
/// written.
pub fn run(args: &RenderArgs) -> Result<(), SpecimenError> {
    let config = load_config(args.config.as_deref(), args.time_scale)?;

    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);

    let sink: Arc<dyn StyleSink> = Arc::new(StyleSheet::new());
    let audio = AudioEngine::new(
        sink,
        AudioOptions {
            pirate_transition: config.timings.pirate.color_shift(),
            seed: Some(seed),
            ..AudioOptions::offline(args.sample_rate)
        },
    );
    if !audio.init() {
        return Err(AudioError::ContextUnavailable(format!(
            "cannot synthesize at {} Hz",
            args.sample_rate
        ))
        .into());
    }
    audio.set_volume_level(args.volume);

    let viewport = if args.mobile {
        Viewport::mobile()
    } else {
        Viewport::desktop()
    };
    let mut renderer = Renderer {
        audio: audio.clone(),
        motion: BeamMotion::new(rng.random()),
        viewport,
        step: scan_interval(&viewport),
        now: Duration::ZERO,
    };

    let entries = simulate(&config.timings, args.pirate_after);
    info!(
        entries = entries.len(),
        sample_rate = args.sample_rate,
        seed,
        "rendering lifecycle audio"
    );
    for entry in &entries {
        renderer.run_until(Duration::from_millis(entry.at_ms));
        renderer.apply(entry)?;
    }
    let end = renderer.now + args.tail;
    renderer.run_until(end);

    let samples = audio.take_output();
    write_wav(&args.output, &samples, args.sample_rate)?;

    #[allow(clippy::cast_precision_loss)]
    let seconds = samples.len() as f64 / f64::from(args.sample_rate);
    info!(path = %args.output.display(), seconds, "render complete");
    println!(
        "wrote {} ({seconds:.1}s, peak {:.3})",
        args.output.display(),
        peak(&samples)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Stage;
    use crate::subscribers::beam::DESKTOP_SCAN_INTERVAL;

    fn args(output: std::path::PathBuf) -> RenderArgs {
        RenderArgs {
            config: None,
            output,
            pirate_after: None,
            time_scale: 0.05,
            sample_rate: 8_000,
            volume: 3,
            tail: Duration::from_millis(500),
            mobile: false,
            seed: Some(11),
        }
    }

    #[test]
    fn renders_full_lifecycle_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decay.wav");
        run(&args(path.clone())).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().channels, 1);
        // lifespan of 1.6s plus the tail
        assert!(reader.duration() >= 8_000 * 2);
    }

    #[test]
    fn renders_pirate_branch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pirate.wav");
        let mut pirate = args(path.clone());
        pirate.pirate_after = Some(Duration::from_millis(200));
        run(&pirate).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_unusable_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = args(dir.path().join("bad.wav"));
        bad.sample_rate = 0;
        let err = run(&bad).unwrap_err();
        assert!(matches!(
            err,
            SpecimenError::Audio(AudioError::ContextUnavailable(_))
        ));
    }

    #[test]
    fn renderer_stops_sweeping_on_death() {
        let sink: Arc<dyn StyleSink> = Arc::new(StyleSheet::new());
        let audio = AudioEngine::new(sink, AudioOptions::offline(8_000));
        let mut renderer = Renderer {
            audio,
            motion: BeamMotion::new(0.0),
            viewport: Viewport::desktop(),
            step: DESKTOP_SCAN_INTERVAL,
            now: Duration::ZERO,
        };
        renderer
            .apply(&Entry {
                at_ms: 0,
                mark: Mark::Notify {
                    stage: Stage::Death,
                    progress: 0.0,
                },
            })
            .unwrap();
        renderer.run_until(Duration::from_secs(1));
        assert_eq!(renderer.motion.phase(), 0.0);
        assert_eq!(renderer.now, Duration::from_secs(1));
    }
}
