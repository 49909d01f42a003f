//! Configuration schema types.
//!
//! Every table defaults to the built-in lifecycle: a 32 second lifespan
//! (24s healthy, 3s panic, 3s decay, 2s death) and a 7 second pirate colour
//! shift. A YAML file only needs to name the values it overrides; per-stage
//! tables are overlaid field by field onto the built-in tables.

use std::time::Duration;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::interaction::InteractionKind;
use crate::lifecycle::{Stage, StageTable};

// ============================================================================
// Root
// ============================================================================

/// Root configuration for a specimen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecimenConfig {
    /// Lifecycle and pirate transition durations.
    pub timings: Timings,

    /// Phosphor colours per stage.
    #[serde(deserialize_with = "overlay")]
    pub colors: StageTable<StageColors>,

    /// Opacity pulsation per stage.
    #[serde(deserialize_with = "overlay")]
    pub breathing: StageTable<Breathing>,

    /// Peripheral vignette per stage.
    #[serde(deserialize_with = "overlay")]
    pub vignette: StageTable<Vignette>,

    /// CRT scan line overlay per stage.
    #[serde(deserialize_with = "overlay")]
    pub scanlines: StageTable<Scanlines>,

    /// Focus blur per stage.
    #[serde(deserialize_with = "overlay")]
    pub blur: StageTable<Blur>,

    /// Text shadow emission per stage.
    #[serde(deserialize_with = "overlay")]
    pub text_shadow: StageTable<TextShadow>,

    /// Voltage flicker per stage.
    #[serde(deserialize_with = "overlay")]
    pub flicker: StageTable<Flicker>,

    /// Interaction reset policy.
    pub interaction: InteractionConfig,
}

/// Deserializes a per-stage table as overrides of its built-in default.
fn overlay<'de, D, T>(deserializer: D) -> Result<StageTable<T>, D::Error>
where
    D: Deserializer<'de>,
    StageTable<T>: Default + Serialize + DeserializeOwned,
{
    let overrides = Value::deserialize(deserializer)?;
    let mut merged = serde_yaml::to_value(StageTable::<T>::default()).map_err(D::Error::custom)?;
    merge(&mut merged, overrides);
    serde_yaml::from_value(merged).map_err(D::Error::custom)
}

fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ============================================================================
// Timings
// ============================================================================

/// Lifecycle timing tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Timings {
    /// Elapsed-time lifecycle.
    pub standard: StandardTimings,

    /// Pirate branch sub-durations.
    pub pirate: PirateTimings,
}

impl Timings {
    /// Returns a copy with every duration multiplied by `factor`.
    ///
    /// Used for accelerated demo runs. Non-finite or negative factors are
    /// treated as `1.0`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let factor = if factor.is_finite() && factor >= 0.0 {
            factor
        } else {
            1.0
        };
        let scale = |ms: u64| -> u64 {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let scaled = (ms as f64 * factor).round() as u64;
            scaled
        };
        Self {
            standard: StandardTimings {
                healthy: scale(self.standard.healthy),
                panic: scale(self.standard.panic),
                decay: scale(self.standard.decay),
                death: scale(self.standard.death),
                total: scale(self.standard.healthy)
                    + scale(self.standard.panic)
                    + scale(self.standard.decay)
                    + scale(self.standard.death),
                opacity_multiplier: self.standard.opacity_multiplier,
            },
            pirate: PirateTimings {
                fade_out_duration: scale(self.pirate.fade_out_duration),
                color_shift_duration: scale(self.pirate.color_shift_duration),
                fade_in_duration: scale(self.pirate.fade_in_duration),
                opacity_multiplier: self.pirate.opacity_multiplier,
            },
        }
    }
}

/// Durations of the elapsed-time lifecycle, in milliseconds.
///
/// `total` must equal the sum of the four stage durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StandardTimings {
    /// Time spent healthy.
    pub healthy: u64,
    /// Time spent panicking.
    pub panic: u64,
    /// Time spent decaying.
    pub decay: u64,
    /// Length of the death stage and of the death transition.
    pub death: u64,
    /// Whole lifespan.
    pub total: u64,
    /// Opacity multiplier applied by renderers.
    pub opacity_multiplier: f64,
}

impl Default for StandardTimings {
    fn default() -> Self {
        Self {
            healthy: 24_000,
            panic: 3_000,
            decay: 3_000,
            death: 2_000,
            total: 32_000,
            opacity_multiplier: 1.0,
        }
    }
}

impl StandardTimings {
    /// Duration of `stage` on the elapsed-time path.
    ///
    /// Returns `None` for `Pirate`, which is never reached by elapsed time.
    #[must_use]
    pub const fn stage_ms(&self, stage: Stage) -> Option<u64> {
        match stage {
            Stage::Healthy => Some(self.healthy),
            Stage::Panic => Some(self.panic),
            Stage::Decay => Some(self.decay),
            Stage::Death => Some(self.death),
            Stage::Pirate => None,
        }
    }

    /// Sum of the four stage durations.
    #[must_use]
    pub const fn lifespan_ms(&self) -> u64 {
        self.healthy
            .saturating_add(self.panic)
            .saturating_add(self.decay)
            .saturating_add(self.death)
    }

    /// Length of the death transition.
    #[must_use]
    pub const fn death_duration(&self) -> Duration {
        Duration::from_millis(self.death)
    }
}

/// Pirate branch durations, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PirateTimings {
    /// Delay before the fade-complete callback fires.
    pub fade_out_duration: u64,
    /// Length of the pirate transition.
    pub color_shift_duration: u64,
    /// Fade-in of the pirate screen, for renderers.
    pub fade_in_duration: u64,
    /// Opacity multiplier applied by renderers.
    pub opacity_multiplier: f64,
}

impl Default for PirateTimings {
    fn default() -> Self {
        Self {
            fade_out_duration: 3_000,
            color_shift_duration: 7_000,
            fade_in_duration: 2_000,
            opacity_multiplier: 1.2,
        }
    }
}

impl PirateTimings {
    /// Delay before the fade-complete callback.
    #[must_use]
    pub const fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_duration)
    }

    /// Length of the pirate transition.
    #[must_use]
    pub const fn color_shift(&self) -> Duration {
        Duration::from_millis(self.color_shift_duration)
    }
}

// ============================================================================
// Visual tables
// ============================================================================

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a colour from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Phosphor emission colours for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageColors {
    /// Beam core.
    pub core: Rgb,
    /// Beam and text glow.
    pub glow: Rgb,
    /// Body text.
    pub text: Rgb,
    /// Body text opacity in `[0, 1]`.
    pub text_opacity: f64,
}

/// Opacity pulsation for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breathing {
    /// Cycle length in seconds; `0` stops the pulse.
    pub speed: f64,
    /// Lower opacity bound.
    pub opacity_min: f64,
    /// Upper opacity bound.
    pub opacity_max: f64,
}

/// Vignette for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vignette {
    /// Clear radius in percent of the viewport.
    pub radius: f64,
    /// Edge opacity.
    pub opacity: f64,
}

/// Scan line overlay for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scanlines {
    /// Overlay opacity.
    pub opacity: f64,
    /// Scroll cycle in seconds.
    pub speed: f64,
}

/// Blur radii in pixels for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Blur {
    /// Titles.
    pub title: f64,
    /// Body text.
    pub text: f64,
    /// Pirate screen.
    pub pirate: f64,
}

/// Text shadow emission for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextShadow {
    /// Spread in pixels.
    pub spread: f64,
    /// Shadow alpha.
    pub intensity: f64,
}

/// Voltage flicker for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Flicker {
    /// Flicker period in seconds.
    pub speed: f64,
    /// Brightness multiplier.
    pub brightness: f64,
}

const fn colors(core: Rgb, glow: Rgb, text: Rgb, text_opacity: f64) -> StageColors {
    StageColors {
        core,
        glow,
        text,
        text_opacity,
    }
}

impl Default for StageTable<StageColors> {
    fn default() -> Self {
        Self {
            healthy: colors(Rgb::new(122, 31, 8), Rgb::new(255, 107, 43), Rgb::new(255, 120, 70), 1.0),
            panic: colors(Rgb::new(138, 10, 2), Rgb::new(255, 60, 30), Rgb::new(255, 90, 50), 1.0),
            decay: colors(Rgb::new(74, 58, 26), Rgb::new(100, 100, 80), Rgb::new(120, 105, 80), 0.7),
            death: colors(Rgb::new(40, 40, 35), Rgb::new(60, 60, 55), Rgb::new(80, 80, 75), 0.0),
            pirate: colors(Rgb::new(0, 20, 40), Rgb::new(0, 200, 255), Rgb::new(220, 240, 255), 0.0),
        }
    }
}

impl Default for StageTable<Breathing> {
    fn default() -> Self {
        let b = |speed, opacity_min, opacity_max| Breathing {
            speed,
            opacity_min,
            opacity_max,
        };
        Self {
            healthy: b(6.0, 0.7, 0.85),
            panic: b(3.0, 0.5, 0.95),
            decay: b(12.0, 0.3, 0.5),
            death: b(0.0, 0.2, 0.2),
            pirate: b(8.0, 0.7, 0.9),
        }
    }
}

impl Default for StageTable<Vignette> {
    fn default() -> Self {
        let v = |radius, opacity| Vignette { radius, opacity };
        Self {
            healthy: v(85.0, 0.02),
            panic: v(65.0, 0.15),
            decay: v(50.0, 0.4),
            death: v(40.0, 0.6),
            pirate: v(75.0, 0.35),
        }
    }
}

impl Default for StageTable<Scanlines> {
    fn default() -> Self {
        let s = |opacity, speed| Scanlines { opacity, speed };
        Self {
            healthy: s(0.1, 2.5),
            panic: s(0.45, 1.5),
            decay: s(0.20, 5.0),
            death: s(0.2, 12.0),
            pirate: s(0.25, 3.0),
        }
    }
}

impl Default for StageTable<Blur> {
    fn default() -> Self {
        let b = |title, text, pirate| Blur {
            title,
            text,
            pirate,
        };
        Self {
            healthy: b(0.3, 0.2, 0.2),
            panic: b(0.5, 0.4, 0.15),
            decay: b(2.5, 2.2, 1.2),
            death: b(8.0, 8.0, 8.0),
            pirate: b(8.0, 8.0, 8.0),
        }
    }
}

impl Default for StageTable<TextShadow> {
    fn default() -> Self {
        let t = |spread, intensity| TextShadow { spread, intensity };
        Self {
            healthy: t(40.0, 0.3),
            panic: t(60.0, 0.6),
            decay: t(10.0, 0.1),
            death: t(5.0, 0.05),
            pirate: t(50.0, 0.5),
        }
    }
}

impl Default for StageTable<Flicker> {
    fn default() -> Self {
        let f = |speed, brightness| Flicker { speed, brightness };
        Self {
            healthy: f(0.3, 1.0),
            panic: f(0.15, 0.95),
            decay: f(0.08, 0.85),
            death: f(0.04, 0.7),
            pirate: f(0.05, 0.75),
        }
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// Which user interactions rebase the lifecycle clock, and how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractionConfig {
    /// Interaction kinds that count as activity.
    pub reset_events: Vec<InteractionKind>,
    /// Minimum spacing between accepted resets.
    pub throttle_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            reset_events: InteractionKind::ALL.to_vec(),
            throttle_ms: 100,
        }
    }
}

impl InteractionConfig {
    /// Throttle window as a `Duration`.
    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}
