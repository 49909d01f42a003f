//! Sine synthesis with scheduled parameter automation.
//!
//! A [`Param`] holds a timeline of set and ramp points in context seconds.
//! Ramps run from the previous point to their own, linearly or
//! exponentially, and the value holds after the last point. A [`Synth`]
//! mixes keyed voices and one-shot voices into a mono buffer at a fixed
//! sample rate, advancing its clock only when asked to render.

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::TAU;
use std::path::Path;

use serde::Serialize;

use crate::error::AudioError;

/// Default output sample rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// Smallest target for exponential ramps, which cannot reach zero.
pub const GAIN_FLOOR: f64 = 0.001;

/// Highest sample rate a context accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Frames rendered between automation pruning passes.
const BLOCK: u64 = 128;

// ============================================================================
// Automation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Curve {
    Step,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    time: f64,
    value: f64,
    curve: Curve,
}

/// Automatable voice parameter (frequency or gain).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    base: f64,
    points: VecDeque<Point>,
}

impl Param {
    /// Creates a parameter holding `value`.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self {
            base: value,
            points: VecDeque::new(),
        }
    }

    /// Sets the value immediately and drops every scheduled point.
    pub fn set(&mut self, value: f64) {
        self.base = value;
        self.points.clear();
    }

    /// Jumps to `value` at `time`.
    pub fn set_at(&mut self, value: f64, time: f64) {
        self.insert(Point {
            time,
            value,
            curve: Curve::Step,
        });
    }

    /// Ramps linearly to `value`, arriving at `end`.
    ///
    /// With nothing scheduled the ramp starts from the current value at
    /// `now`.
    pub fn linear_ramp(&mut self, value: f64, now: f64, end: f64) {
        self.anchor(now);
        self.insert(Point {
            time: end,
            value,
            curve: Curve::Linear,
        });
    }

    /// Ramps exponentially to `value` (at least [`GAIN_FLOOR`]), arriving at
    /// `end`.
    pub fn exponential_ramp(&mut self, value: f64, now: f64, end: f64) {
        self.anchor(now);
        self.insert(Point {
            time: end,
            value: value.max(GAIN_FLOOR),
            curve: Curve::Exponential,
        });
    }

    /// Freezes the parameter at its value at `time`, dropping every point
    /// from `time` on. Returns the frozen value.
    pub fn hold(&mut self, time: f64) -> f64 {
        let value = self.value_at(time);
        self.points.retain(|p| p.time < time);
        self.set_at(value, time);
        value
    }

    /// Value at `time`.
    #[must_use]
    pub fn value_at(&self, time: f64) -> f64 {
        let mut prev: Option<(f64, f64)> = None;
        let mut value = self.base;
        for p in &self.points {
            if time < p.time {
                let Some((t0, v0)) = prev else {
                    return value;
                };
                let span = p.time - t0;
                if span <= 0.0 {
                    return value;
                }
                let frac = (time - t0) / span;
                return match p.curve {
                    Curve::Step => v0,
                    Curve::Linear => (p.value - v0).mul_add(frac, v0),
                    Curve::Exponential if v0 > 0.0 && p.value > 0.0 => {
                        v0 * (p.value / v0).powf(frac)
                    }
                    Curve::Exponential => v0,
                };
            }
            prev = Some((p.time, p.value));
            value = p.value;
        }
        value
    }

    /// Number of scheduled points.
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.points.len()
    }

    fn anchor(&mut self, now: f64) {
        if self.points.is_empty() {
            self.set_at(self.base, now);
        }
    }

    fn insert(&mut self, point: Point) {
        let at = self
            .points
            .iter()
            .position(|p| p.time > point.time)
            .unwrap_or(self.points.len());
        self.points.insert(at, point);
    }

    /// Forgets points that can no longer affect values from `time` on.
    fn prune(&mut self, time: f64) {
        while self.points.len() >= 2 && self.points[1].time <= time {
            self.points.pop_front();
        }
        if self.points.len() == 1 && self.points[0].time <= time {
            self.base = self.points[0].value;
            self.points.clear();
        }
    }
}

// ============================================================================
// Voices
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct Lfo {
    frequency: f64,
    depth: f64,
    phase: f64,
}

/// A sine oscillator with its own gain stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    /// Oscillator frequency in Hz.
    pub frequency: Param,
    /// Output gain.
    pub gain: Param,
    phase: f64,
    lfo: Option<Lfo>,
    stop_at: Option<f64>,
}

impl Voice {
    /// Creates a sine voice.
    #[must_use]
    pub const fn sine(frequency: f64, gain: f64) -> Self {
        Self {
            frequency: Param::new(frequency),
            gain: Param::new(gain),
            phase: 0.0,
            lfo: None,
            stop_at: None,
        }
    }

    /// Modulates the frequency by a sine LFO of `depth` Hz.
    #[must_use]
    pub const fn with_lfo(mut self, frequency: f64, depth: f64) -> Self {
        self.lfo = Some(Lfo {
            frequency,
            depth,
            phase: 0.0,
        });
        self
    }

    /// Silences the voice from `time` on.
    pub const fn stop_at(&mut self, time: f64) {
        self.stop_at = Some(time);
    }

    /// Silences the voice from `time` on.
    #[must_use]
    pub const fn stopping_at(mut self, time: f64) -> Self {
        self.stop_at = Some(time);
        self
    }

    fn is_finished(&self, time: f64) -> bool {
        self.stop_at.is_some_and(|stop| time >= stop)
    }

    fn sample(&mut self, time: f64, dt: f64) -> f64 {
        if self.is_finished(time) {
            return 0.0;
        }
        let mut frequency = self.frequency.value_at(time);
        if let Some(lfo) = self.lfo.as_mut() {
            frequency += lfo.depth * (TAU * lfo.phase).sin();
            lfo.phase = lfo.frequency.mul_add(dt, lfo.phase).fract();
        }
        let out = (TAU * self.phase).sin() * self.gain.value_at(time);
        self.phase = frequency.mul_add(dt, self.phase).rem_euclid(1.0);
        out
    }

    fn prune(&mut self, time: f64) {
        self.frequency.prune(time);
        self.gain.prune(time);
    }
}

/// Long-lived voices addressed by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceKey {
    /// CRT hum fundamental.
    Hum,
    /// CRT hum second harmonic.
    Harmonic2,
    /// CRT hum third harmonic.
    Harmonic3,
    /// Cross-fade voice of the pirate transition.
    Transition,
    /// Schumann resonance carrier.
    SchumannCarrier,
    /// Schumann resonance harmonic.
    SchumannHarmonic,
    /// Beam sweep tone.
    Beam,
}

// ============================================================================
// Synth
// ============================================================================

/// Offline mixing context.
#[derive(Debug, Clone)]
pub struct Synth {
    sample_rate: u32,
    frame: u64,
    voices: BTreeMap<VoiceKey, Voice>,
    one_shots: Vec<Voice>,
    capture: bool,
    output: Vec<f32>,
}

impl Synth {
    /// Creates a context.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::ContextUnavailable`] for a zero or
    /// out-of-range sample rate.
    pub fn new(sample_rate: u32, capture: bool) -> Result<Self, AudioError> {
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(AudioError::ContextUnavailable(format!(
                "unsupported sample rate {sample_rate} Hz"
            )));
        }
        Ok(Self {
            sample_rate,
            frame: 0,
            voices: BTreeMap::new(),
            one_shots: Vec::new(),
            capture,
            output: Vec::new(),
        })
    }

    /// Samples per second.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Context time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let now = self.frame as f64 / f64::from(self.sample_rate);
        now
    }

    /// Starts a keyed voice, replacing any voice under the same key.
    pub fn start(&mut self, key: VoiceKey, voice: Voice) {
        self.voices.insert(key, voice);
    }

    /// Stops and removes a keyed voice. Returns `false` if none was running.
    pub fn stop(&mut self, key: VoiceKey) -> bool {
        self.voices.remove(&key).is_some()
    }

    /// Returns `true` while a keyed voice exists.
    #[must_use]
    pub fn has(&self, key: VoiceKey) -> bool {
        self.voices.contains_key(&key)
    }

    /// Mutable access to a keyed voice.
    pub fn voice_mut(&mut self, key: VoiceKey) -> Option<&mut Voice> {
        self.voices.get_mut(&key)
    }

    /// Shared access to a keyed voice.
    #[must_use]
    pub fn voice(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(&key)
    }

    /// Keys of running voices, in key order.
    #[must_use]
    pub fn keys(&self) -> Vec<VoiceKey> {
        self.voices.keys().copied().collect()
    }

    /// Plays a voice until its stop time, then forgets it.
    pub fn play(&mut self, voice: Voice) {
        self.one_shots.push(voice);
    }

    /// One-shot voices still sounding.
    #[must_use]
    pub fn one_shots(&self) -> usize {
        self.one_shots.len()
    }

    /// Renders up to `time` seconds. Earlier times are ignored.
    pub fn render_until(&mut self, time: f64) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = (time.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let dt = 1.0 / f64::from(self.sample_rate);

        while self.frame < target {
            let block_end = target.min(self.frame + BLOCK);
            let block_start = self.now();
            for voice in self.voices.values_mut().chain(self.one_shots.iter_mut()) {
                voice.prune(block_start);
            }
            if self.capture {
                for frame in self.frame..block_end {
                    #[allow(clippy::cast_precision_loss)]
                    let t = frame as f64 * dt;
                    let mut mix = 0.0;
                    for voice in self.voices.values_mut().chain(self.one_shots.iter_mut()) {
                        mix += voice.sample(t, dt);
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    self.output.push(mix as f32);
                }
            }
            self.frame = block_end;
        }

        let now = self.now();
        self.one_shots.retain(|v| !v.is_finished(now));
        self.voices.retain(|_, v| !v.is_finished(now));
    }

    /// Takes the captured samples, leaving the buffer empty.
    pub fn take_output(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.output)
    }
}

// ============================================================================
// Output
// ============================================================================

/// Writes mono samples as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns [`AudioError::Wav`] if the file cannot be created or written.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Peak absolute amplitude.
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Root mean square amplitude.
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let rms = (sum / samples.len() as f64).sqrt() as f32;
    rms
}
