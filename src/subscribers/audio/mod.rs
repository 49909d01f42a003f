//! Audio subscriber: CRT hum, Schumann hum, beam tone and one-shot chimes.
//!
//! Tones are synthesized by [`synth::Synth`] on a clock that is either the
//! wall clock or driven by hand (offline rendering). Timed follow-ups such
//! as the death teardown run when the clock passes them, so the same code
//! serves the live run and the WAV render.

pub mod synth;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::lifecycle::{Stage, Subscriber, SubscriberError};
use crate::render::StyleSink;

use super::beam::{BeamObserver, ScanReport};
pub use synth::{SAMPLE_RATE, Synth, Voice, VoiceKey, write_wav};

// ============================================================================
// Levels and tables
// ============================================================================

/// Gain of the hum fundamental at full volume.
pub const BASE_VOLUME: f64 = 0.04;

/// Gain multiplier per volume level (0 is mute).
pub const VOLUME_MULTIPLIERS: [f64; 4] = [0.0, 0.3, 0.6, 1.0];

/// Highest volume level.
pub const MAX_VOLUME_LEVEL: u8 = 3;

/// Beam tone gain, independent of the volume level.
pub const BASE_BEAM_GAIN: f64 = 0.015;

/// Element id of the volume toggle.
pub const AUDIO_TOGGLE: &str = "audio-toggle";

/// Hum voices as (key, frequency multiple, relative gain).
const HUM_PARTIALS: [(VoiceKey, f64, f64); 3] = [
    (VoiceKey::Hum, 1.0, 1.0),
    (VoiceKey::Harmonic2, 2.0, 0.3),
    (VoiceKey::Harmonic3, 3.0, 0.15),
];

const HUM_FREQUENCY: f64 = 60.0;
const STAGE_RAMP: f64 = 0.5;
const VOLUME_RAMP: f64 = 0.1;

const DEATH_FADE: f64 = 2.0;
const BEAM_DEATH_FADE: f64 = 1.5;
const DEATH_TEARDOWN: f64 = 2.5;

const SCHUMANN_CARRIER: f64 = 62.64;
const SCHUMANN_RESONANCE: f64 = 7.83;
const SCHUMANN_DEPTH: f64 = 3.0;
const SCHUMANN_HARMONIC: f64 = 125.28;
const SCHUMANN_CARRIER_GAIN: f64 = 1.8;
const SCHUMANN_HARMONIC_GAIN: f64 = 0.6;

const BEAM_FREQUENCY: f64 = 67.83;
const PIRATE_BEAM_FREQUENCY: f64 = 69.64;
const BEAM_SPREAD: f64 = 4.0;

const LEAK_CHORD: [(f64, f64); 3] = [(523.25, 261.63), (659.25, 329.63), (783.99, 392.00)];

/// Default cross-fade length of the pirate transition.
pub const DEFAULT_PIRATE_TRANSITION: Duration = Duration::from_secs(7);

/// Hum pitch and loudness for a stage. Terminal stages use the healthy row.
#[must_use]
pub const fn stage_tone(stage: Stage) -> (f64, f64) {
    match stage {
        Stage::Panic => (57.0, 0.85),
        Stage::Decay => (52.0, 0.6),
        Stage::Healthy | Stage::Death | Stage::Pirate => (60.0, 1.0),
    }
}

/// CSS `filter` and `opacity` of the volume toggle for a stage.
#[must_use]
pub const fn toggle_look(stage: Stage) -> (&'static str, &'static str) {
    match stage {
        Stage::Healthy => ("blur(0.03px)", "0.7"),
        Stage::Panic => ("brightness(0.95) blur(0.05px)", "0.65"),
        Stage::Decay => ("hue-rotate(15deg) brightness(0.75) blur(0.6px)", "0.55"),
        Stage::Death => ("brightness(0) blur(10px)", "0"),
        Stage::Pirate => ("hue-rotate(180deg) brightness(1.1) saturate(1.3) blur(0px)", "0.8"),
    }
}

fn base_level(volume_level: u8) -> f64 {
    BASE_VOLUME * VOLUME_MULTIPLIERS[usize::from(volume_level.min(MAX_VOLUME_LEVEL))]
}

// ============================================================================
// Options
// ============================================================================

/// Where the synthesis clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioClock {
    /// Seconds since the engine was created.
    #[default]
    Wall,
    /// Seconds set through [`AudioEngine::advance_to`].
    Manual,
}

/// Audio engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOptions {
    /// Synthesis sample rate in Hz.
    pub sample_rate: u32,
    /// Clock source.
    pub clock: AudioClock,
    /// Keep rendered samples for [`AudioEngine::take_output`].
    pub capture: bool,
    /// Cross-fade length when the pirate stage is first entered.
    pub pirate_transition: Duration,
    /// Seed for the phosphor tick pitch jitter.
    pub seed: Option<u64>,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            clock: AudioClock::Wall,
            capture: false,
            pirate_transition: DEFAULT_PIRATE_TRANSITION,
            seed: None,
        }
    }
}

impl AudioOptions {
    /// Offline rendering: hand-driven clock with capture on.
    #[must_use]
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: AudioClock::Manual,
            capture: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    DeathTeardown,
    PirateSettle,
}

struct AudioState {
    synth: Option<Synth>,
    volume_level: u8,
    current_stage: Stage,
    death_sequence: bool,
    pirate_mode: bool,
    manual_now: f64,
    deferred: Vec<(f64, Deferred)>,
    rng: StdRng,
}

impl AudioState {
    fn now(&self) -> f64 {
        self.synth.as_ref().map_or(self.manual_now, Synth::now)
    }

    fn audible(&self) -> bool {
        self.synth.is_some() && self.volume_level > 0
    }
}

/// The audio subscriber. Clones share one engine.
///
/// Nothing sounds until [`init`](Self::init) succeeds and a volume level
/// above zero is chosen, which mirrors the user gesture a browser requires.
#[derive(Clone)]
pub struct AudioEngine {
    state: Arc<Mutex<AudioState>>,
    sink: Arc<dyn StyleSink>,
    options: AudioOptions,
    origin: Instant,
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AudioEngine")
            .field("ready", &state.synth.is_some())
            .field("volume_level", &state.volume_level)
            .field("death_sequence", &state.death_sequence)
            .field("pirate_mode", &state.pirate_mode)
            .finish_non_exhaustive()
    }
}

impl AudioEngine {
    /// Creates an engine at volume level 1, not yet initialized.
    #[must_use]
    pub fn new(sink: Arc<dyn StyleSink>, options: AudioOptions) -> Self {
        let seed = options.seed.unwrap_or_else(|| rand::rng().random());
        Self {
            state: Arc::new(Mutex::new(AudioState {
                synth: None,
                volume_level: 1,
                current_stage: Stage::Healthy,
                death_sequence: false,
                pirate_mode: false,
                manual_now: 0.0,
                deferred: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
            })),
            sink,
            options,
            origin: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state with the synthesis clock brought up to date.
    fn current(&self) -> MutexGuard<'_, AudioState> {
        let mut state = self.lock();
        let target = match self.options.clock {
            AudioClock::Wall => self.origin.elapsed().as_secs_f64(),
            AudioClock::Manual => state.manual_now,
        };
        Self::catch_up(&mut state, target);
        state
    }

    fn catch_up(state: &mut AudioState, target: f64) {
        if state.synth.is_none() {
            return;
        }
        loop {
            let due = state
                .deferred
                .iter()
                .enumerate()
                .filter(|(_, (at, _))| *at <= target)
                .min_by(|a, b| a.1.0.total_cmp(&b.1.0))
                .map(|(i, _)| i);
            let Some(index) = due else { break };
            let (at, action) = state.deferred.remove(index);
            if let Some(synth) = state.synth.as_mut() {
                synth.render_until(at);
            }
            Self::run_deferred(state, action);
        }
        if let Some(synth) = state.synth.as_mut() {
            synth.render_until(target);
        }
    }

    fn run_deferred(state: &mut AudioState, action: Deferred) {
        match action {
            Deferred::DeathTeardown => {
                debug!("death teardown");
                Self::cleanup_crt_hum(state);
                Self::cleanup_beam(state);
            }
            Deferred::PirateSettle => {
                debug!("pirate cross-fade settled");
                Self::cleanup_crt_hum(state);
                if state.volume_level > 0 {
                    Self::setup_schumann_hum(state);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------------

    /// Opens the synthesis context. Returns `false` if it cannot be created;
    /// the failure is logged and not retried here.
    pub fn init(&self) -> bool {
        let mut state = self.lock();
        if state.synth.is_some() {
            return true;
        }
        match Synth::new(self.options.sample_rate, self.options.capture) {
            Ok(mut synth) => {
                let start = match self.options.clock {
                    AudioClock::Wall => self.origin.elapsed().as_secs_f64(),
                    AudioClock::Manual => state.manual_now,
                };
                synth.render_until(start);
                state.synth = Some(synth);
                info!(sample_rate = self.options.sample_rate, "audio context ready");
                true
            }
            Err(e) => {
                warn!(error = %e, "audio unavailable");
                false
            }
        }
    }

    /// Advances a manual clock to `seconds`, rendering and running any
    /// timed follow-ups on the way. Earlier times are ignored.
    pub fn advance_to(&self, seconds: f64) {
        let mut state = self.lock();
        if seconds > state.manual_now {
            state.manual_now = seconds;
        }
        drop(state);
        drop(self.current());
    }

    /// Takes the captured samples.
    pub fn take_output(&self) -> Vec<f32> {
        self.lock()
            .synth
            .as_mut()
            .map(Synth::take_output)
            .unwrap_or_default()
    }

    /// Synthesis sample rate.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.options.sample_rate
    }

    // ------------------------------------------------------------------------
    // Volume
    // ------------------------------------------------------------------------

    /// Sets the volume level (clamped to 0..=3).
    ///
    /// Level 0 tears every long-lived voice down. A non-zero level starts the
    /// hum that fits the current mode if none is running, otherwise ramps
    /// the running hum to the new loudness.
    pub fn set_volume_level(&self, level: u8) {
        let mut state = self.current();
        state.volume_level = level.min(MAX_VOLUME_LEVEL);
        if state.synth.is_none() {
            return;
        }
        if state.volume_level == 0 {
            Self::cleanup_crt_hum(&mut state);
            Self::cleanup_schumann_hum(&mut state);
            Self::cleanup_beam(&mut state);
            return;
        }
        let (has_schumann, has_hum) = state.synth.as_ref().map_or((false, false), |s| {
            (s.has(VoiceKey::SchumannCarrier), s.has(VoiceKey::Hum))
        });
        if state.pirate_mode && !has_schumann {
            Self::setup_schumann_hum(&mut state);
        } else if !state.pirate_mode && !state.death_sequence && !has_hum {
            Self::setup_crt_hum(&mut state);
        } else {
            Self::update_hum_volumes(&mut state);
        }
    }

    /// Cycles the volume like the toggle button: the first press opens the
    /// context at level 1, later presses step 1, 2, 3, 0, 1, ...
    ///
    /// Returns the new level, or `None` if the context could not be opened.
    pub fn toggle_volume(&self) -> Option<u8> {
        let level = if self.is_ready() {
            (self.volume_level() + 1) % (MAX_VOLUME_LEVEL + 1)
        } else {
            if !self.init() {
                return None;
            }
            1
        };
        self.set_volume_level(level);
        for candidate in 0..=MAX_VOLUME_LEVEL {
            self.sink
                .set_class(AUDIO_TOGGLE, &format!("volume-{candidate}"), candidate == level);
        }
        Some(level)
    }

    fn update_hum_volumes(state: &mut AudioState) {
        let target = base_level(state.volume_level);
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        let weights = HUM_PARTIALS
            .iter()
            .map(|(key, _, weight)| (*key, *weight))
            .chain([
                (VoiceKey::SchumannCarrier, SCHUMANN_CARRIER_GAIN),
                (VoiceKey::SchumannHarmonic, SCHUMANN_HARMONIC_GAIN),
            ]);
        for (key, weight) in weights {
            if let Some(voice) = synth.voice_mut(key) {
                voice
                    .gain
                    .exponential_ramp(target * weight, now, now + VOLUME_RAMP);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Hums
    // ------------------------------------------------------------------------

    fn setup_crt_hum(state: &mut AudioState) {
        Self::cleanup_crt_hum(state);
        if state.death_sequence || state.pirate_mode {
            return;
        }
        let level = base_level(state.volume_level);
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        for (key, multiple, weight) in HUM_PARTIALS {
            synth.start(key, Voice::sine(HUM_FREQUENCY * multiple, level * weight));
        }
        debug!("crt hum started");
    }

    fn cleanup_crt_hum(state: &mut AudioState) {
        if let Some(synth) = state.synth.as_mut() {
            for (key, _, _) in HUM_PARTIALS {
                synth.stop(key);
            }
        }
    }

    fn setup_schumann_hum(state: &mut AudioState) {
        Self::cleanup_schumann_hum(state);
        let level = base_level(state.volume_level);
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        synth.start(
            VoiceKey::SchumannCarrier,
            Voice::sine(SCHUMANN_CARRIER, level * SCHUMANN_CARRIER_GAIN)
                .with_lfo(SCHUMANN_RESONANCE, SCHUMANN_DEPTH),
        );
        synth.start(
            VoiceKey::SchumannHarmonic,
            Voice::sine(SCHUMANN_HARMONIC, level * SCHUMANN_HARMONIC_GAIN),
        );
        debug!("schumann hum started");
    }

    fn cleanup_schumann_hum(state: &mut AudioState) {
        if let Some(synth) = state.synth.as_mut() {
            synth.stop(VoiceKey::SchumannCarrier);
            synth.stop(VoiceKey::SchumannHarmonic);
        }
    }

    fn cleanup_beam(state: &mut AudioState) {
        if let Some(synth) = state.synth.as_mut() {
            synth.stop(VoiceKey::Beam);
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn sync_to_stage(&self, state: &mut AudioState, stage: Stage) {
        state.current_stage = stage;
        if stage == Stage::Death && !state.death_sequence {
            Self::begin_death_locked(state);
            return;
        }
        if stage == Stage::Pirate && !state.pirate_mode {
            self.begin_pirate_locked(state, self.options.pirate_transition);
            return;
        }
        if !state.audible() || state.death_sequence || state.pirate_mode {
            return;
        }

        let (frequency, loudness) = stage_tone(stage);
        let modulated = base_level(state.volume_level) * loudness;
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        for (key, multiple, weight) in HUM_PARTIALS {
            if let Some(voice) = synth.voice_mut(key) {
                voice
                    .frequency
                    .exponential_ramp(frequency * multiple, now, now + STAGE_RAMP);
                voice
                    .gain
                    .exponential_ramp(modulated * weight, now, now + STAGE_RAMP);
            }
        }
    }

    /// Fades the hum and beam tone out and tears them down 2.5s later.
    /// Runs at most once; silent or uninitialized engines ignore it.
    pub fn begin_death(&self) {
        let mut state = self.current();
        Self::begin_death_locked(&mut state);
    }

    fn begin_death_locked(state: &mut AudioState) {
        if !state.audible() || state.death_sequence {
            return;
        }
        state.death_sequence = true;
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        for (key, _, _) in HUM_PARTIALS {
            if let Some(voice) = synth.voice_mut(key) {
                voice.gain.hold(now);
                voice
                    .gain
                    .exponential_ramp(synth::GAIN_FLOOR, now, now + DEATH_FADE);
            }
        }
        if let Some(voice) = synth.voice_mut(VoiceKey::Beam) {
            voice.gain.hold(now);
            voice
                .gain
                .exponential_ramp(synth::GAIN_FLOOR, now, now + BEAM_DEATH_FADE);
        }
        state
            .deferred
            .push((now + DEATH_TEARDOWN, Deferred::DeathTeardown));
        info!("audio death sequence");
    }

    /// Cross-fades the CRT hum into the Schumann hum over `duration`.
    pub fn begin_pirate_transition(&self, duration: Duration) {
        let mut state = self.current();
        self.begin_pirate_locked(&mut state, duration);
    }

    fn begin_pirate_locked(&self, state: &mut AudioState, duration: Duration) {
        if !state.audible() {
            return;
        }
        state.pirate_mode = true;
        let span = duration.as_secs_f64();
        let level = base_level(state.volume_level);
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        let end = now + span;

        for (key, _, _) in HUM_PARTIALS {
            if let Some(voice) = synth.voice_mut(key) {
                voice.gain.exponential_ramp(synth::GAIN_FLOOR, now, end);
            }
        }

        let mut bridge = Voice::sine(HUM_FREQUENCY, level * 0.5).stopping_at(end);
        bridge.frequency.set_at(HUM_FREQUENCY, now);
        bridge.frequency.exponential_ramp(SCHUMANN_CARRIER, now, end);
        bridge.gain.set_at(level * 0.5, now);
        bridge.gain.linear_ramp(level * 2.0, now, span.mul_add(0.5, now));
        bridge
            .gain
            .exponential_ramp(level * SCHUMANN_CARRIER_GAIN, now, end);
        synth.start(VoiceKey::Transition, bridge);

        state.deferred.push((end, Deferred::PirateSettle));
        info!(
            duration = %humantime::format_duration(duration),
            "audio pirate transition"
        );
    }

    // ------------------------------------------------------------------------
    // One-shots
    // ------------------------------------------------------------------------

    /// Plays the falling three-note leak chime.
    pub fn trigger_leak_sound(&self) {
        let mut state = self.current();
        if !state.audible() {
            return;
        }
        let volume = 0.08 * VOLUME_MULTIPLIERS[usize::from(state.volume_level)];
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        for (i, (from, to)) in (0_u8..).zip(LEAK_CHORD) {
            let mut voice = Voice::sine(from, 0.0).stopping_at(now + 0.4);
            voice.frequency.set_at(from, now);
            voice.frequency.exponential_ramp(to, now, now + 0.3);
            voice.gain.set_at(0.0, now);
            voice
                .gain
                .linear_ramp(volume * f64::from(i).mul_add(-0.2, 1.0), now, now + 0.02);
            voice
                .gain
                .exponential_ramp(synth::GAIN_FLOOR, now, now + 0.35);
            synth.play(voice);
        }
    }

    /// Plays a 3ms click at a random pitch between 400 and 500Hz. Pirate mode
    /// only.
    pub fn trigger_phosphor_tick(&self) {
        let mut state = self.current();
        if !state.audible() || !state.pirate_mode {
            return;
        }
        let volume = 0.006 * VOLUME_MULTIPLIERS[usize::from(state.volume_level)];
        let frequency = 400.0 + state.rng.random::<f64>() * 100.0;
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        let mut voice = Voice::sine(frequency, volume).stopping_at(now + 0.003);
        voice.gain.set_at(volume, now);
        voice
            .gain
            .exponential_ramp(synth::GAIN_FLOOR, now, now + 0.002);
        synth.play(voice);
    }

    /// Plays a low double pulse. Pirate mode only.
    pub fn trigger_thinking_pulse(&self) {
        let mut state = self.current();
        if !state.audible() || !state.pirate_mode {
            return;
        }
        let volume = 0.12 * VOLUME_MULTIPLIERS[usize::from(state.volume_level)];
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        let mut voice = Voice::sine(72.0, 0.0).stopping_at(now + 0.4);
        voice.gain.set_at(0.0, now);
        voice.gain.linear_ramp(volume, now, now + 0.06);
        voice.gain.exponential_ramp(volume * 0.2, now, now + 0.12);
        voice.gain.linear_ramp(volume * 0.7, now, now + 0.22);
        voice
            .gain
            .exponential_ramp(synth::GAIN_FLOOR, now, now + 0.35);
        synth.play(voice);
    }

    // ------------------------------------------------------------------------
    // Beam
    // ------------------------------------------------------------------------

    /// Follows the beam: starts the beam tone or glides it towards a pitch
    /// that rises and falls ±2Hz with the beam's height.
    pub fn beam_sweep(&self, beam_y: f64, viewport_height: f64) {
        let mut state = self.current();
        if !state.audible() || state.death_sequence {
            return;
        }
        let base = if state.pirate_mode {
            PIRATE_BEAM_FREQUENCY
        } else {
            BEAM_FREQUENCY
        };
        let variation = if viewport_height > 0.0 {
            (beam_y / viewport_height - 0.5) * BEAM_SPREAD
        } else {
            0.0
        };
        let frequency = base + variation;
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        match synth.voice_mut(VoiceKey::Beam) {
            Some(voice) => voice
                .frequency
                .exponential_ramp(frequency, now, now + VOLUME_RAMP),
            None => synth.start(VoiceKey::Beam, Voice::sine(frequency, BASE_BEAM_GAIN)),
        }
    }

    /// Dips the beam tone an octave and a bit and swells it, for a beam
    /// touching the volume toggle.
    pub fn ui_contact(&self) {
        let mut state = self.current();
        if !state.audible() {
            return;
        }
        let Some(synth) = state.synth.as_mut() else {
            return;
        };
        let now = synth.now();
        let Some(voice) = synth.voice_mut(VoiceKey::Beam) else {
            return;
        };
        let pitch = voice.frequency.hold(now);
        voice.frequency.exponential_ramp(pitch * 0.2, now, now + 0.1);
        voice.frequency.exponential_ramp(pitch, now, now + 0.4);

        voice.gain.hold(now);
        voice.gain.set_at(BASE_BEAM_GAIN, now);
        voice.gain.linear_ramp(BASE_BEAM_GAIN * 3.0, now, now + 0.1);
        voice.gain.exponential_ramp(BASE_BEAM_GAIN, now, now + 0.4);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Returns `true` once the context is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().synth.is_some()
    }

    /// Current volume level.
    #[must_use]
    pub fn volume_level(&self) -> u8 {
        self.lock().volume_level
    }

    /// Returns `true` once the death fade began.
    #[must_use]
    pub fn is_death_sequence(&self) -> bool {
        self.lock().death_sequence
    }

    /// Returns `true` once the pirate cross-fade began.
    #[must_use]
    pub fn is_pirate_mode(&self) -> bool {
        self.lock().pirate_mode
    }

    /// Last stage seen.
    #[must_use]
    pub fn current_stage(&self) -> Stage {
        self.lock().current_stage
    }

    /// Clock time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.current().now()
    }

    /// Long-lived voices currently running.
    #[must_use]
    pub fn active_voices(&self) -> Vec<VoiceKey> {
        self.current()
            .synth
            .as_ref()
            .map(Synth::keys)
            .unwrap_or_default()
    }

    /// Returns `true` while the voice runs.
    #[must_use]
    pub fn has_voice(&self, key: VoiceKey) -> bool {
        self.current().synth.as_ref().is_some_and(|s| s.has(key))
    }

    /// One-shot voices still sounding.
    #[must_use]
    pub fn one_shots(&self) -> usize {
        self.current().synth.as_ref().map_or(0, Synth::one_shots)
    }

    /// Gain of a running voice, now.
    #[must_use]
    pub fn voice_gain(&self, key: VoiceKey) -> Option<f64> {
        let state = self.current();
        let synth = state.synth.as_ref()?;
        synth.voice(key).map(|v| v.gain.value_at(synth.now()))
    }

    /// Frequency of a running voice, now.
    #[must_use]
    pub fn voice_frequency(&self, key: VoiceKey) -> Option<f64> {
        let state = self.current();
        let synth = state.synth.as_ref()?;
        synth.voice(key).map(|v| v.frequency.value_at(synth.now()))
    }
}

impl Subscriber for AudioEngine {
    fn on_stage(&mut self, stage: Stage, _progress: f64) -> Result<(), SubscriberError> {
        let mut state = self.current();
        self.sync_to_stage(&mut state, stage);
        drop(state);

        let (filter, opacity) = toggle_look(stage);
        self.sink.set_element_style(AUDIO_TOGGLE, "filter", filter);
        self.sink.set_element_style(AUDIO_TOGGLE, "opacity", opacity);
        Ok(())
    }

    fn name(&self) -> &str {
        "audio"
    }
}

impl BeamObserver for AudioEngine {
    fn on_scan(&self, report: &ScanReport) {
        self.beam_sweep(report.beam_y, report.viewport_height);
        if report.new_contacts.iter().any(|id| id == AUDIO_TOGGLE) {
            self.ui_contact();
        }
        if !report.new_contacts.is_empty() {
            self.trigger_phosphor_tick();
        }
    }
}
