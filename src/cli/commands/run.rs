//! Live headless run.
//!
//! Starts a decay engine with every subscriber attached to an in-memory
//! style sheet, feeds it simulated interactions and an optional pirate
//! trigger, and stops when the engine dies, the run length elapses or a
//! shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cli::args::RunArgs;
use crate::cli::commands::{Shutdown, load_config};
use crate::error::SpecimenError;
use crate::interaction::InteractionGate;
use crate::lifecycle::{ContentHooks, DecayEngine, EngineObserver};
use crate::observability::{
    Event, EventEmitter, EventRecorder, MetricsRecorder, RunSummary, StopReason, init_metrics,
};
use crate::render::{Scene, StaticScene, StyleSheet, StyleSink, Target, Viewport};
use crate::subscribers::audio::AUDIO_TOGGLE;
use crate::subscribers::{Atmosphere, AudioEngine, AudioOptions, BeamScanner, ParticleField};

/// How often the loop checks for death and the run length limit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Element hidden when the lifecycle ends.
const PRIMARY_CONTENT: &str = "main";

/// Element revealed after death.
const TERMINAL_SCREEN: &str = "terminal";

/// Content hooks that toggle classes on the style sheet.
struct PageHooks {
    sink: Arc<dyn StyleSink>,
}

impl ContentHooks for PageHooks {
    fn hide_primary_content(&self) {
        self.sink.set_class(PRIMARY_CONTENT, "hidden", true);
    }

    fn prepare_terminal_screen(&self) {
        self.sink.set_class(TERMINAL_SCREEN, "visible", true);
    }
}

/// Runs the lifecycle until it dies or is stopped.
///
/// # Errors
///
/// Returns an error if the configuration fails to load, the metrics
/// endpoint or event file cannot be opened, or the engine refuses to start.
pub async fn run(args: &RunArgs, shutdown: Shutdown) -> Result<(), SpecimenError> {
    if args.lines == 0 {
        return Err(SpecimenError::Usage("--lines must be at least 1".to_string()));
    }

    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(args.config.as_deref(), args.time_scale)?;

    let emitter = Arc::new(match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    });
    let recorder = Arc::new(EventRecorder::new(Arc::clone(&emitter)));

    let sheet = Arc::new(StyleSheet::new());
    let sink: Arc<dyn StyleSink> = sheet.clone();

    let mut builder = DecayEngine::builder(config.timings.clone())
        .hooks(Arc::new(PageHooks {
            sink: Arc::clone(&sink),
        }))
        .observer(recorder.clone() as Arc<dyn EngineObserver>);
    if args.metrics_port.is_some() {
        builder = builder.observer(Arc::new(MetricsRecorder::new()));
    }
    let engine = builder.build();

    let viewport = if args.mobile {
        Viewport::mobile()
    } else {
        Viewport::desktop()
    };
    let mut page = StaticScene::text_page(viewport, args.lines);
    page.targets.insert(0, Target::new(AUDIO_TOGGLE, 20.0, 20.0));
    let scene: Arc<dyn Scene> = Arc::new(page);

    let audio = AudioEngine::new(
        Arc::clone(&sink),
        AudioOptions {
            pirate_transition: config.timings.pirate.color_shift(),
            ..AudioOptions::default()
        },
    );
    if args.volume > 0 && !audio.init() {
        warn!("continuing without audio");
    }
    audio.set_volume_level(args.volume);

    let beam = BeamScanner::new(Arc::clone(&sink)).with_observer(Arc::new(audio.clone()));
    let particles = ParticleField::new(Arc::clone(&sink), &viewport);

    engine.subscribe(Atmosphere::new(Arc::clone(&config), Arc::clone(&sink)));
    engine.subscribe(beam.clone());
    engine.subscribe(particles.clone());
    engine.subscribe(audio.clone());

    let loops = shutdown.child_token();
    let collision = beam.spawn_collision_loop(Arc::clone(&scene), loops.clone());
    let reveal = particles.spawn_reveal_loop(beam.clone(), Arc::clone(&scene), loops.clone());

    let gate = InteractionGate::new(engine.clone(), &config.interaction);
    if let Some(every) = args.interact_every
        && !gate.accepts(args.interact_kind)
    {
        warn!(
            kind = %args.interact_kind,
            every = %humantime::format_duration(every),
            "interaction kind is not a reset event; simulated interactions will be ignored"
        );
    }

    let started = Instant::now();
    engine.start()?;
    info!(
        lifespan_ms = config.timings.standard.lifespan_ms(),
        "lifecycle running"
    );

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut interact = args.interact_every.map(|every| {
        let mut interval = tokio::time::interval_at(started + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let pirate_sleep = tokio::time::sleep(args.pirate_after.unwrap_or_default());
    tokio::pin!(pirate_sleep);
    let mut pirate_pending = args.pirate_after.is_some();

    let reason = loop {
        tokio::select! {
            reason = shutdown.requested() => break reason,
            _ = poll.tick() => {
                if engine.is_dead() {
                    break StopReason::Died;
                }
                if let Some(limit) = args.max_duration
                    && started.elapsed() >= limit
                {
                    break StopReason::TimeLimit;
                }
            }
            () = &mut pirate_sleep, if pirate_pending => {
                pirate_pending = false;
                let pulse = audio.clone();
                match engine.enter_pirate_mode(move || pulse.trigger_thinking_pulse()) {
                    Ok(()) => info!("pirate trigger fired"),
                    Err(e) => debug!(error = %e, "pirate trigger ignored"),
                }
            }
            _ = async {
                match interact.as_mut() {
                    Some(interval) => interval.tick().await,
                    None => std::future::pending().await,
                }
            } => {
                if gate.handle(args.interact_kind) {
                    audio.trigger_leak_sound();
                }
            }
        }
    };

    loops.cancel();
    for handle in [collision, reveal] {
        if let Err(e) = handle.await {
            warn!(error = %e, "background loop failed");
        }
    }

    let summary = RunSummary {
        final_stage: engine.stage(),
        interaction_resets: recorder.interaction_resets(),
        subscriber_failures: recorder.subscriber_failures(),
        uptime_secs: started.elapsed().as_secs_f64(),
    };
    info!(?reason, %summary, "run stopped");
    emitter.emit(Event::EngineStopped {
        timestamp: chrono::Utc::now(),
        reason,
        summary: Some(summary.clone()),
    });
    emitter.flush();

    if args.dump_styles {
        println!("{}", serde_json::to_string_pretty(&sheet.snapshot())?);
    }
    println!("{summary}");
    Ok(())
}
