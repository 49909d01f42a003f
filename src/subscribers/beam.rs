//! Electron beam scanner.
//!
//! The beam sweeps the viewport top to bottom at a per-stage speed and
//! stops on death. A collision loop, independent of the engine tick,
//! classifies every nearby text target against the beam's centre line and
//! toggles proximity classes on it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::lifecycle::{Stage, Subscriber, SubscriberError};
use crate::render::style::css_number;
use crate::render::{Rect, Scene, StyleSink, Viewport};

/// Beam body element.
pub const BODY: &str = "beam-body";
/// Beam glow element.
pub const GLOW: &str = "beam-glow";
/// Beam hotspot element.
pub const HOTSPOT: &str = "beam-hotspot";

const ELEMENTS: [&str; 3] = [BODY, GLOW, HOTSPOT];

/// Collision check period on desktop.
pub const DESKTOP_SCAN_INTERVAL: Duration = Duration::from_millis(25);
/// Collision check period below the mobile breakpoint.
pub const MOBILE_SCAN_INTERVAL: Duration = Duration::from_millis(50);

const DESKTOP_BUFFER: f64 = 200.0;
const MOBILE_BUFFER: f64 = 100.0;
const MIN_TARGET_HEIGHT: f64 = 20.0;
const APPROACH_DISTANCE: f64 = 40.0;
const MIN_CONTACT_DISTANCE: f64 = 10.0;

/// Seconds per sweep for `stage`; `None` means the beam is stopped.
#[must_use]
pub const fn beam_speed(stage: Stage) -> Option<f64> {
    match stage {
        Stage::Healthy | Stage::Pirate => Some(8.0),
        Stage::Panic => Some(5.0),
        Stage::Decay => Some(15.0),
        Stage::Death => None,
    }
}

/// Collision loop period for a viewport.
#[must_use]
pub fn scan_interval(viewport: &Viewport) -> Duration {
    if viewport.is_mobile() {
        MOBILE_SCAN_INTERVAL
    } else {
        DESKTOP_SCAN_INTERVAL
    }
}

// ============================================================================
// Motion
// ============================================================================

/// Position of the beam within one sweep.
///
/// Changing speed keeps the phase, so the beam never jumps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamMotion {
    phase: f64,
    speed: Option<f64>,
}

impl BeamMotion {
    /// Starts a sweep at `phase` (wrapped into `[0, 1)`) moving at 8s per
    /// sweep.
    #[must_use]
    pub fn new(phase: f64) -> Self {
        Self {
            phase: phase.rem_euclid(1.0),
            speed: beam_speed(Stage::Healthy),
        }
    }

    /// Fraction of the sweep completed.
    #[must_use]
    pub const fn phase(&self) -> f64 {
        self.phase
    }

    /// Seconds per sweep, `None` while stopped.
    #[must_use]
    pub const fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Changes the sweep speed.
    pub fn set_speed(&mut self, speed: Option<f64>) {
        self.speed = speed.filter(|s| *s > 0.0);
    }

    /// Moves the beam forward by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        if let Some(speed) = self.speed {
            self.phase = (self.phase + dt.as_secs_f64() / speed).rem_euclid(1.0);
        }
    }

    /// Centre line of the beam in viewport coordinates.
    #[must_use]
    pub fn y(&self, viewport: &Viewport) -> f64 {
        self.phase * viewport.height
    }
}

// ============================================================================
// Classification
// ============================================================================

/// How close the beam is to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    /// Out of range.
    Clear,
    /// Within the target's band and close to its centre.
    Approaching,
    /// Touching the target.
    Contact,
}

/// Classifies `target` (viewport coordinates) against the beam at `beam_y`.
///
/// Targets shorter than 20px are padded to 20px, equally above and below.
#[must_use]
pub fn classify(beam_y: f64, target: Rect) -> Proximity {
    let effective = target.height.max(MIN_TARGET_HEIGHT);
    let padding = (effective - target.height) / 2.0;
    let in_band = beam_y >= target.top - padding && beam_y <= target.bottom() + padding;
    let distance = (beam_y - target.center_y()).abs();

    if !in_band || distance >= APPROACH_DISTANCE {
        Proximity::Clear
    } else if distance < MIN_CONTACT_DISTANCE.max(target.height / 2.0) {
        Proximity::Contact
    } else {
        Proximity::Approaching
    }
}

/// Outcome of one collision check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    /// Beam centre line, viewport coordinates.
    pub beam_y: f64,
    /// Viewport height at scan time.
    pub viewport_height: f64,
    /// Targets approached but not touched.
    pub approaching: Vec<String>,
    /// Targets touched.
    pub contacts: Vec<String>,
    /// Targets touched now but not on the previous check.
    pub new_contacts: Vec<String>,
}

/// Receiver of scan reports.
pub trait BeamObserver: Send + Sync {
    /// Called after every collision check that ran.
    fn on_scan(&self, report: &ScanReport);
}

// ============================================================================
// Scanner
// ============================================================================

struct BeamState {
    motion: BeamMotion,
    moved_at: Instant,
    current_speed: Option<f64>,
    paused: bool,
    contacts: BTreeSet<String>,
}

impl BeamState {
    fn catch_up(&mut self) {
        let now = Instant::now();
        self.motion
            .advance(now.saturating_duration_since(self.moved_at));
        self.moved_at = now;
    }
}

/// Beam subscriber and collision detector. Clones share one beam.
#[derive(Clone)]
pub struct BeamScanner {
    state: Arc<Mutex<BeamState>>,
    sink: Arc<dyn StyleSink>,
    observer: Option<Arc<dyn BeamObserver>>,
}

impl std::fmt::Debug for BeamScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BeamScanner")
            .field("motion", &state.motion)
            .field("paused", &state.paused)
            .finish_non_exhaustive()
    }
}

impl BeamScanner {
    /// Creates a beam at a random point of its sweep.
    ///
    /// Publishes `--beam-start-position` (0 to 50% above the top edge) and a
    /// matching negative animation delay on the beam elements.
    #[must_use]
    pub fn new(sink: Arc<dyn StyleSink>) -> Self {
        let mut rng = rand::rng();
        let start: f64 = rng.random::<f64>() * 0.5;
        let phase: f64 = rng.random();
        Self::with_phase(sink, start, phase)
    }

    /// Creates a beam at a chosen start offset and phase.
    #[must_use]
    pub fn with_phase(sink: Arc<dyn StyleSink>, start_fraction: f64, phase: f64) -> Self {
        let motion = BeamMotion::new(phase);
        sink.set_property(
            "--beam-start-position",
            &format!("-{}%", css_number(start_fraction * 100.0)),
        );
        let initial_speed = motion.speed().unwrap_or_default();
        let delay = format!("-{}s", css_number(motion.phase() * initial_speed));
        for element in ELEMENTS {
            sink.set_element_style(element, "animation-delay", &delay);
        }
        Self {
            state: Arc::new(Mutex::new(BeamState {
                motion,
                moved_at: Instant::now(),
                current_speed: motion.speed(),
                paused: false,
                contacts: BTreeSet::new(),
            })),
            sink,
            observer: None,
        }
    }

    /// Sends scan reports to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn BeamObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BeamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Beam centre line in viewport coordinates, now.
    #[must_use]
    pub fn position(&self, viewport: &Viewport) -> f64 {
        let mut state = self.lock();
        state.catch_up();
        state.motion.y(viewport)
    }

    /// Returns `true` once death stopped the beam.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Current seconds per sweep.
    #[must_use]
    pub fn speed(&self) -> Option<f64> {
        self.lock().current_speed
    }

    fn sync_to_stage(&self, stage: Stage) {
        let mut state = self.lock();
        let speed = beam_speed(stage);
        if speed == state.current_speed {
            return;
        }
        state.catch_up();
        state.current_speed = speed;
        state.motion.set_speed(speed);

        match speed {
            Some(seconds) => {
                self.sink
                    .set_property("--beam-speed", &format!("{}s", css_number(seconds)));
                if state.paused {
                    state.paused = false;
                    self.set_play_state("running");
                }
            }
            None => {
                state.paused = true;
                self.set_play_state("paused");
                debug!(%stage, "beam stopped");
            }
        }
    }

    fn set_play_state(&self, play_state: &str) {
        for element in ELEMENTS {
            self.sink
                .set_element_style(element, "animation-play-state", play_state);
        }
    }

    /// Runs one collision check against `scene`.
    ///
    /// Returns `None` while the beam is stopped. Targets whose top edge lies
    /// outside the viewport widened by 200px (100px on mobile) are left
    /// untouched.
    pub fn scan(&self, scene: &dyn Scene) -> Option<ScanReport> {
        let viewport = scene.viewport();
        let mut state = self.lock();
        if state.paused {
            return None;
        }
        state.catch_up();
        let beam_y = state.motion.y(&viewport);

        let buffer = if viewport.is_mobile() {
            MOBILE_BUFFER
        } else {
            DESKTOP_BUFFER
        };
        let visible_top = viewport.scroll_y - buffer;
        let visible_bottom = viewport.scroll_y + viewport.height + buffer;

        let mut report = ScanReport {
            beam_y,
            viewport_height: viewport.height,
            ..ScanReport::default()
        };
        let mut hit = false;

        for target in scene.targets() {
            if target.rect.top < visible_top || target.rect.top > visible_bottom {
                continue;
            }
            let on_screen = Rect::new(target.rect.top - viewport.scroll_y, target.rect.height);
            match classify(beam_y, on_screen) {
                Proximity::Contact => {
                    self.sink.set_class(GLOW, "approaching", true);
                    self.sink.set_class(&target.id, "beam-approaching", true);
                    self.sink.set_class(&target.id, "beam-contact", true);
                    self.sink.set_class(HOTSPOT, "active", true);
                    hit = true;
                    report.contacts.push(target.id);
                }
                Proximity::Approaching => {
                    self.sink.set_class(GLOW, "approaching", true);
                    self.sink.set_class(&target.id, "beam-approaching", true);
                    self.sink.set_class(&target.id, "beam-contact", false);
                    report.approaching.push(target.id);
                }
                Proximity::Clear => {
                    self.sink.set_class(&target.id, "beam-contact", false);
                    self.sink.set_class(&target.id, "beam-approaching", false);
                }
            }
        }

        if !hit {
            self.sink.set_class(HOTSPOT, "active", false);
            self.sink.set_class(GLOW, "approaching", false);
        }

        report.new_contacts = report
            .contacts
            .iter()
            .filter(|id| !state.contacts.contains(*id))
            .cloned()
            .collect();
        state.contacts = report.contacts.iter().cloned().collect();
        drop(state);

        if let Some(observer) = &self.observer {
            observer.on_scan(&report);
        }
        Some(report)
    }

    /// Spawns the collision loop.
    ///
    /// The period is chosen once, from the viewport at spawn time. The loop
    /// ends when `cancel` fires.
    pub fn spawn_collision_loop(
        &self,
        scene: Arc<dyn Scene>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let beam = self.clone();
        let period = scan_interval(&scene.viewport());
        debug!(period_ms = period.as_millis(), "starting beam collision loop");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("beam collision loop cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Some(report) = beam.scan(scene.as_ref()) {
                            trace!(beam_y = report.beam_y, contacts = report.contacts.len(), "beam scan");
                        }
                    }
                }
            }
        })
    }
}

impl Subscriber for BeamScanner {
    fn on_stage(&mut self, stage: Stage, _progress: f64) -> Result<(), SubscriberError> {
        self.sync_to_stage(stage);
        Ok(())
    }

    fn name(&self) -> &str {
        "beam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{StaticScene, StyleSheet, Target};

    fn scanner_at(phase: f64) -> (BeamScanner, Arc<StyleSheet>) {
        let sheet = Arc::new(StyleSheet::new());
        let sink: Arc<dyn StyleSink> = sheet.clone();
        (BeamScanner::with_phase(sink, 0.25, phase), sheet)
    }

    fn scene(targets: Vec<Target>) -> StaticScene {
        StaticScene {
            viewport: Viewport {
                width: 1440.0,
                height: 1000.0,
                scroll_y: 0.0,
            },
            targets,
        }
    }

    #[test]
    fn speed_table() {
        assert_eq!(beam_speed(Stage::Healthy), Some(8.0));
        assert_eq!(beam_speed(Stage::Panic), Some(5.0));
        assert_eq!(beam_speed(Stage::Decay), Some(15.0));
        assert_eq!(beam_speed(Stage::Death), None);
        assert_eq!(beam_speed(Stage::Pirate), Some(8.0));
    }

    #[test]
    fn classify_contact_and_approach() {
        let line = Rect::new(100.0, 30.0);
        assert_eq!(classify(115.0, line), Proximity::Contact);
        // At the band edge the distance to the centre is 15, the contact radius.
        assert_eq!(classify(100.0, line), Proximity::Approaching);
        assert_eq!(classify(200.0, line), Proximity::Clear);
    }

    #[test]
    fn short_targets_are_padded() {
        let dot = Rect::new(100.0, 4.0);
        // Band widens to [92, 112]; contact radius is 10.
        assert_eq!(classify(93.0, dot), Proximity::Contact);
        assert_eq!(classify(91.0, dot), Proximity::Clear);
    }

    #[test]
    fn tall_targets_cap_approach_at_forty() {
        let block = Rect::new(0.0, 200.0);
        assert_eq!(classify(100.0, block), Proximity::Contact);
        assert_eq!(classify(10.0, block), Proximity::Clear);
    }

    #[test]
    fn motion_keeps_phase_across_speed_changes() {
        let mut motion = BeamMotion::new(0.0);
        motion.advance(Duration::from_secs(2));
        assert!((motion.phase() - 0.25).abs() < 1e-9);

        motion.set_speed(Some(15.0));
        motion.advance(Duration::from_secs(3));
        assert!((motion.phase() - 0.45).abs() < 1e-9);

        motion.set_speed(None);
        motion.advance(Duration::from_secs(30));
        assert!((motion.phase() - 0.45).abs() < 1e-9);
    }

    #[test]
    fn motion_wraps() {
        let mut motion = BeamMotion::new(0.9);
        motion.advance(Duration::from_secs(1));
        assert!((motion.phase() - 0.025).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn start_position_is_published() {
        let (_beam, sheet) = scanner_at(0.5);
        assert_eq!(sheet.property("--beam-start-position").as_deref(), Some("-25%"));
        assert_eq!(sheet.element_style(BODY, "animation-delay").as_deref(), Some("-4s"));
    }

    #[tokio::test(start_paused = true)]
    async fn speed_published_on_change_only() {
        let (mut beam, sheet) = scanner_at(0.0);
        beam.on_stage(Stage::Healthy, 0.1).unwrap();
        assert_eq!(sheet.property("--beam-speed"), None);

        beam.on_stage(Stage::Panic, 0.0).unwrap();
        beam.on_stage(Stage::Panic, 0.5).unwrap();
        assert_eq!(sheet.property("--beam-speed").as_deref(), Some("5s"));
        assert_eq!(beam.speed(), Some(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn death_pauses_and_freezes_the_beam() {
        let (mut beam, sheet) = scanner_at(0.0);
        let viewport = scene(Vec::new()).viewport;
        beam.on_stage(Stage::Death, 0.0).unwrap();
        assert!(beam.is_paused());
        assert_eq!(
            sheet.element_style(HOTSPOT, "animation-play-state").as_deref(),
            Some("paused")
        );
        let y = beam.position(&viewport);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!((beam.position(&viewport) - y).abs() < f64::EPSILON);
        assert!(beam.scan(&scene(Vec::new())).is_none());

        beam.on_stage(Stage::Healthy, 0.0).unwrap();
        assert!(!beam.is_paused());
        assert_eq!(
            sheet.element_style(BODY, "animation-play-state").as_deref(),
            Some("running")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn beam_moves_with_time() {
        let (beam, _sheet) = scanner_at(0.0);
        let viewport = scene(Vec::new()).viewport;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!((beam.position(&viewport) - 250.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_marks_contact_and_clears_it() {
        let (beam, sheet) = scanner_at(0.1);
        let page = scene(vec![
            Target::new("title", 90.0, 20.0),
            Target::new("footer", 900.0, 20.0),
        ]);

        let report = beam.scan(&page).unwrap();
        assert_eq!(report.contacts, vec!["title"]);
        assert_eq!(report.new_contacts, vec!["title"]);
        assert!(sheet.has_class("title", "beam-contact"));
        assert!(sheet.has_class(HOTSPOT, "active"));
        assert!(sheet.has_class(GLOW, "approaching"));
        assert!(!sheet.has_class("footer", "beam-approaching"));

        let again = beam.scan(&page).unwrap();
        assert!(again.new_contacts.is_empty());

        // 8s sweep over 1000px: one second moves the beam 125px.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let later = beam.scan(&page).unwrap();
        assert!(later.contacts.is_empty());
        assert!(!sheet.has_class("title", "beam-contact"));
        assert!(!sheet.has_class("title", "beam-approaching"));
        assert!(!sheet.has_class(HOTSPOT, "active"));
        assert!(!sheet.has_class(GLOW, "approaching"));
    }

    #[tokio::test(start_paused = true)]
    async fn offscreen_targets_are_left_alone() {
        let (beam, sheet) = scanner_at(0.1);
        sheet.set_class("far-away", "beam-contact", true);
        let page = scene(vec![Target::new("far-away", 5_000.0, 20.0)]);
        beam.scan(&page).unwrap();
        assert!(sheet.has_class("far-away", "beam-contact"));
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_offsets_target_positions() {
        let (beam, sheet) = scanner_at(0.1);
        let mut page = scene(vec![Target::new("below", 1_090.0, 20.0)]);
        page.viewport.scroll_y = 1_000.0;
        let report = beam.scan(&page).unwrap();
        assert_eq!(report.contacts, vec!["below"]);
        assert!(sheet.has_class("below", "beam-contact"));
    }

    #[tokio::test(start_paused = true)]
    async fn observer_receives_reports() {
        #[derive(Default)]
        struct Seen(Mutex<Vec<ScanReport>>);
        impl BeamObserver for Seen {
            fn on_scan(&self, report: &ScanReport) {
                self.0.lock().unwrap().push(report.clone());
            }
        }

        let seen = Arc::new(Seen::default());
        let sheet = Arc::new(StyleSheet::new());
        let beam = BeamScanner::with_phase(sheet, 0.0, 0.5).with_observer(seen.clone());
        let page = Arc::new(scene(Vec::new()));
        let cancel = CancellationToken::new();
        let handle = beam.spawn_collision_loop(page, cancel.clone());

        tokio::time::sleep(Duration::from_millis(110)).await;
        cancel.cancel();
        handle.await.unwrap();

        let reports = seen.0.lock().unwrap();
        assert_eq!(reports.len(), 5);
        assert!(reports.windows(2).all(|w| w[0].beam_y < w[1].beam_y));
    }
}
