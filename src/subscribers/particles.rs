//! Ambient particle drift.
//!
//! Three depth layers of particles drift up the viewport. The field dims
//! with the lifecycle, fades most particles out in decay and all of them in
//! death, and lights up particles near the beam.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lifecycle::{Stage, Subscriber, SubscriberError};
use crate::render::style::css_number;
use crate::render::{Scene, StyleSink, Viewport};

use super::beam::BeamScanner;

/// Period of the beam proximity loop.
pub const REVEAL_INTERVAL: Duration = Duration::from_millis(40);

const MOBILE_DENSITY: f64 = 0.6;
const FADE_TRANSITION: &str = "opacity 2s ease-out";

/// Depth layer of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Small, blurred and slow.
    Far,
    /// Middle distance.
    Mid,
    /// Large, sharp and fast.
    Near,
}

/// Static parameters of one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSpec {
    /// Particles on a desktop viewport.
    pub count: usize,
    /// Diameter range in pixels.
    pub size: (f64, f64),
    /// Blur range in pixels.
    pub blur: (f64, f64),
    /// Seconds to drift across the viewport.
    pub drift_seconds: f64,
    /// Beam distance within which particles light up.
    pub reveal_range: f64,
}

impl Layer {
    /// Layers from back to front.
    pub const ALL: [Self; 3] = [Self::Far, Self::Mid, Self::Near];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Far => "far",
            Self::Mid => "mid",
            Self::Near => "near",
        }
    }

    /// Parameters of the layer.
    #[must_use]
    pub const fn spec(self) -> LayerSpec {
        match self {
            Self::Far => LayerSpec {
                count: 25,
                size: (1.5, 3.0),
                blur: (3.0, 5.0),
                drift_seconds: 60.0,
                reveal_range: 120.0,
            },
            Self::Mid => LayerSpec {
                count: 18,
                size: (2.0, 4.0),
                blur: (1.0, 2.0),
                drift_seconds: 35.0,
                reveal_range: 90.0,
            },
            Self::Near => LayerSpec {
                count: 7,
                size: (3.0, 5.0),
                blur: (0.0, 0.5),
                drift_seconds: 15.0,
                reveal_range: 60.0,
            },
        }
    }

    /// Particle count for a viewport, thinned on mobile.
    #[must_use]
    pub fn count_for(self, viewport: &Viewport) -> usize {
        let count = self.spec().count;
        if viewport.is_mobile() {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let thinned = (count as f64 * MOBILE_DENSITY).floor() as usize;
            thinned
        } else {
            count
        }
    }
}

/// Field opacity multiplier for `stage`.
#[must_use]
pub const fn opacity_multiplier(stage: Stage) -> f64 {
    match stage {
        Stage::Healthy | Stage::Pirate => 1.0,
        Stage::Panic => 0.8,
        Stage::Decay => 0.5,
        Stage::Death => 0.2,
    }
}

/// Fraction of each layer that stays visible in `stage`, if any fading
/// applies.
#[must_use]
pub const fn surviving_fraction(stage: Stage) -> Option<f64> {
    match stage {
        Stage::Decay => Some(0.4),
        Stage::Death => Some(0.0),
        _ => None,
    }
}

/// Brightness of a particle `distance` px from the beam, or `None` when
/// out of `range`.
#[must_use]
pub fn reveal_brightness(distance: f64, range: f64) -> Option<f64> {
    (distance < range).then(|| 1.0 + (1.0 - distance / range) * 0.8)
}

/// Normally distributed sample (Box-Muller).
pub fn gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    let z0 = (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos();
    z0.mul_add(std_dev, mean)
}

/// One particle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Particle {
    /// Element id, `particle-<layer>-<index>`.
    pub id: String,
    /// Depth layer.
    pub layer: Layer,
    /// Position within its layer.
    pub index: usize,
    /// Horizontal position in percent.
    pub x_percent: f64,
    /// Diameter in pixels.
    pub size: f64,
    /// Resting blur in pixels.
    pub blur: f64,
    /// Seconds already drifted at creation.
    pub head_start: f64,
    /// Faded out by the lifecycle.
    pub faded: bool,
}

impl Particle {
    /// Vertical centre in viewport coordinates `elapsed` seconds after the
    /// field was created. Particles rise from the bottom edge to the top.
    #[must_use]
    pub fn y(&self, elapsed: f64, viewport_height: f64) -> f64 {
        let drift = self.layer.spec().drift_seconds;
        let cycle = ((elapsed + self.head_start) / drift).rem_euclid(1.0);
        viewport_height * (1.0 - cycle)
    }

    fn resting_filter(&self) -> String {
        format!("blur({}px)", css_number(self.blur))
    }
}

fn spawn_particles(viewport: &Viewport, rng: &mut impl Rng) -> Vec<Particle> {
    let mut particles = Vec::new();
    for layer in Layer::ALL {
        let spec = layer.spec();
        for index in 0..layer.count_for(viewport) {
            let x = gaussian(rng, 50.0, 20.0).clamp(5.0, 95.0);
            let size = rng.random_range(spec.size.0..=spec.size.1);
            let blur = rng.random_range(spec.blur.0..=spec.blur.1);
            let head_start = rng.random::<f64>() * spec.drift_seconds;
            particles.push(Particle {
                id: format!("particle-{}-{index}", layer.as_str()),
                layer,
                index,
                x_percent: x,
                size,
                blur,
                head_start,
                faded: false,
            });
        }
    }
    particles
}

// ============================================================================
// Field
// ============================================================================

struct FieldState {
    particles: Vec<Particle>,
    created_at: Instant,
}

/// Particle field subscriber. Clones share one field.
#[derive(Clone)]
pub struct ParticleField {
    state: Arc<Mutex<FieldState>>,
    sink: Arc<dyn StyleSink>,
}

impl std::fmt::Debug for ParticleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleField")
            .field("particles", &self.lock().particles.len())
            .finish_non_exhaustive()
    }
}

impl ParticleField {
    /// Creates a randomly laid out field for `viewport`.
    #[must_use]
    pub fn new(sink: Arc<dyn StyleSink>, viewport: &Viewport) -> Self {
        Self::with_rng(sink, viewport, &mut rand::rng())
    }

    /// Creates a reproducible field.
    #[must_use]
    pub fn seeded(sink: Arc<dyn StyleSink>, viewport: &Viewport, seed: u64) -> Self {
        Self::with_rng(sink, viewport, &mut StdRng::seed_from_u64(seed))
    }

    fn with_rng(sink: Arc<dyn StyleSink>, viewport: &Viewport, rng: &mut impl Rng) -> Self {
        let particles = spawn_particles(viewport, rng);
        for p in &particles {
            let size = format!("{}px", css_number(p.size));
            sink.set_class(&p.id, "particle", true);
            sink.set_element_style(&p.id, "left", &format!("{}%", css_number(p.x_percent)));
            sink.set_element_style(&p.id, "width", &size);
            sink.set_element_style(&p.id, "height", &size);
            sink.set_element_style(&p.id, "filter", &p.resting_filter());
            sink.set_element_style(
                &p.id,
                "animation-delay",
                &format!("-{}s", css_number(p.head_start)),
            );
            sink.set_element_style(
                &p.id,
                "animation-duration",
                &format!("{}s", css_number(p.layer.spec().drift_seconds)),
            );
        }
        debug!(count = particles.len(), mobile = viewport.is_mobile(), "particle field created");
        Self {
            state: Arc::new(Mutex::new(FieldState {
                particles,
                created_at: Instant::now(),
            })),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FieldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every particle.
    #[must_use]
    pub fn particles(&self) -> Vec<Particle> {
        self.lock().particles.clone()
    }

    /// Number of particles still visible.
    #[must_use]
    pub fn visible(&self) -> usize {
        self.lock().particles.iter().filter(|p| !p.faded).count()
    }

    fn fade_out(&self, fraction: f64) {
        let mut state = self.lock();
        for layer in Layer::ALL {
            let in_layer = state.particles.iter().filter(|p| p.layer == layer).count();
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let keep = (in_layer as f64 * fraction).floor() as usize;
            for p in state
                .particles
                .iter_mut()
                .filter(|p| p.layer == layer && p.index >= keep && !p.faded)
            {
                p.faded = true;
                self.sink.set_element_style(&p.id, "transition", FADE_TRANSITION);
                self.sink.set_element_style(&p.id, "opacity", "0");
            }
        }
    }

    /// Lights up particles near the beam. Returns how many are lit.
    pub fn reveal(&self, beam_y: f64, viewport: &Viewport) -> usize {
        let state = self.lock();
        let elapsed = state.created_at.elapsed().as_secs_f64();
        let mut lit = 0;
        for p in &state.particles {
            let distance = (beam_y - p.y(elapsed, viewport.height)).abs();
            match reveal_brightness(distance, p.layer.spec().reveal_range) {
                Some(brightness) => {
                    lit += 1;
                    self.sink.set_class(&p.id, "beam-revealed", true);
                    self.sink.set_element_style(
                        &p.id,
                        "filter",
                        &format!("{} brightness({})", p.resting_filter(), css_number(brightness)),
                    );
                }
                None => {
                    self.sink.set_class(&p.id, "beam-revealed", false);
                    self.sink.set_element_style(&p.id, "filter", &p.resting_filter());
                }
            }
        }
        lit
    }

    /// Spawns the beam proximity loop. Ends when `cancel` fires.
    pub fn spawn_reveal_loop(
        &self,
        beam: BeamScanner,
        scene: Arc<dyn Scene>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let field = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REVEAL_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("particle reveal loop cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let viewport = scene.viewport();
                        field.reveal(beam.position(&viewport), &viewport);
                    }
                }
            }
        })
    }
}

impl Subscriber for ParticleField {
    fn on_stage(&mut self, stage: Stage, _progress: f64) -> Result<(), SubscriberError> {
        self.sink.set_property(
            "--particle-decay-multiplier",
            &css_number(opacity_multiplier(stage)),
        );
        if let Some(fraction) = surviving_fraction(stage) {
            self.fade_out(fraction);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "particles"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::StyleSheet;

    fn field(viewport: &Viewport) -> (ParticleField, Arc<StyleSheet>) {
        let sheet = Arc::new(StyleSheet::new());
        let sink: Arc<dyn StyleSink> = sheet.clone();
        (ParticleField::seeded(sink, viewport, 7), sheet)
    }

    fn count(field: &ParticleField, layer: Layer) -> usize {
        field.particles().iter().filter(|p| p.layer == layer).count()
    }

    #[tokio::test(start_paused = true)]
    async fn desktop_and_mobile_densities() {
        let (desktop, _) = field(&Viewport::desktop());
        assert_eq!(count(&desktop, Layer::Far), 25);
        assert_eq!(count(&desktop, Layer::Mid), 18);
        assert_eq!(count(&desktop, Layer::Near), 7);

        let (mobile, _) = field(&Viewport::mobile());
        assert_eq!(count(&mobile, Layer::Far), 15);
        assert_eq!(count(&mobile, Layer::Mid), 10);
        assert_eq!(count(&mobile, Layer::Near), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn particles_respect_layer_ranges() {
        let (field, sheet) = field(&Viewport::desktop());
        for p in field.particles() {
            let spec = p.layer.spec();
            assert!((5.0..=95.0).contains(&p.x_percent));
            assert!((spec.size.0..=spec.size.1).contains(&p.size));
            assert!((spec.blur.0..=spec.blur.1).contains(&p.blur));
            assert!((0.0..spec.drift_seconds).contains(&p.head_start));
            assert!(sheet.has_class(&p.id, "particle"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_fields_are_reproducible() {
        let (a, _) = field(&Viewport::desktop());
        let (b, _) = field(&Viewport::desktop());
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn multiplier_table() {
        assert!((opacity_multiplier(Stage::Healthy) - 1.0).abs() < f64::EPSILON);
        assert!((opacity_multiplier(Stage::Panic) - 0.8).abs() < f64::EPSILON);
        assert!((opacity_multiplier(Stage::Decay) - 0.5).abs() < f64::EPSILON);
        assert!((opacity_multiplier(Stage::Death) - 0.2).abs() < f64::EPSILON);
        assert!((opacity_multiplier(Stage::Pirate) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reveal_brightness_scales_with_distance() {
        let close = reveal_brightness(0.0, 120.0).unwrap();
        let halfway = reveal_brightness(60.0, 120.0).unwrap();
        assert!((close - 1.8).abs() < 1e-9);
        assert!((halfway - 1.4).abs() < 1e-9);
        assert_eq!(reveal_brightness(120.0, 120.0), None);
    }

    #[test]
    fn gaussian_centres_on_mean() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 4_000;
        let mean = (0..n).map(|_| gaussian(&mut rng, 50.0, 20.0)).sum::<f64>() / f64::from(n);
        assert!((mean - 50.0).abs() < 2.0, "mean {mean}");
    }

    #[tokio::test(start_paused = true)]
    async fn decay_keeps_forty_percent_of_each_layer() {
        let (mut field, sheet) = field(&Viewport::desktop());
        field.on_stage(Stage::Decay, 0.0).unwrap();

        assert_eq!(sheet.property("--particle-decay-multiplier").as_deref(), Some("0.5"));
        // Far keeps 10 of 25, mid 7 of 18, near 2 of 7.
        assert_eq!(field.visible(), 19);
        assert_eq!(
            sheet.element_style("particle-far-10", "opacity").as_deref(),
            Some("0")
        );
        assert_eq!(sheet.element_style("particle-far-9", "opacity"), None);
        assert_eq!(
            sheet.element_style("particle-near-6", "transition").as_deref(),
            Some(FADE_TRANSITION)
        );

        let writes = sheet.writes();
        field.on_stage(Stage::Decay, 0.5).unwrap();
        assert_eq!(sheet.writes(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn death_fades_everything() {
        let (mut field, sheet) = field(&Viewport::desktop());
        field.on_stage(Stage::Death, 0.0).unwrap();
        assert_eq!(field.visible(), 0);
        assert_eq!(sheet.property("--particle-decay-multiplier").as_deref(), Some("0.2"));
    }

    #[test]
    fn particles_drift_upwards() {
        let p = Particle {
            id: "particle-near-0".to_string(),
            layer: Layer::Near,
            index: 0,
            x_percent: 50.0,
            size: 4.0,
            blur: 0.0,
            head_start: 0.0,
            faded: false,
        };
        assert!((p.y(0.0, 900.0) - 900.0).abs() < 1e-9);
        assert!((p.y(3.0, 900.0) - 720.0).abs() < 1e-9);
        assert!((p.y(15.0, 900.0) - 900.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn beam_reveals_nearby_particles() {
        let viewport = Viewport::desktop();
        let (field, sheet) = field(&viewport);
        let target = field.particles()[3].clone();
        let beam_y = target.y(0.0, viewport.height);

        let lit = field.reveal(beam_y, &viewport);
        assert!(lit >= 1);
        assert!(sheet.has_class(&target.id, "beam-revealed"));
        assert_eq!(
            sheet.element_style(&target.id, "filter"),
            Some(format!("blur({}px) brightness(1.8)", css_number(target.blur)))
        );

        field.reveal(beam_y + 10_000.0, &viewport);
        assert!(!sheet.has_class(&target.id, "beam-revealed"));
        assert_eq!(sheet.element_style(&target.id, "filter"), Some(target.resting_filter()));
    }
}
