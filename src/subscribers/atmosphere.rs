//! Stage atmosphere: colours, breathing, vignette, scan lines, blur, text
//! shadow and flicker published as CSS custom properties.

use std::sync::Arc;

use tracing::debug;

use crate::config::SpecimenConfig;
use crate::lifecycle::{Stage, Subscriber, SubscriberError};
use crate::render::StyleSink;
use crate::render::style::css_number;

/// Element that carries the `stage-*` class.
pub const STAGE_ELEMENT: &str = "body";

/// Publishes the per-stage visual tables.
///
/// Table values are written once per stage entry; only `--stage-progress`
/// changes on every notification.
pub struct Atmosphere {
    config: Arc<SpecimenConfig>,
    sink: Arc<dyn StyleSink>,
    current: Option<Stage>,
}

impl Atmosphere {
    /// Creates the subscriber. Nothing is written until the first
    /// notification.
    #[must_use]
    pub fn new(config: Arc<SpecimenConfig>, sink: Arc<dyn StyleSink>) -> Self {
        Self {
            config,
            sink,
            current: None,
        }
    }

    fn publish_stage(&self, stage: Stage) {
        let c = &self.config;
        let sink = self.sink.as_ref();
        let num = |name: &str, value: f64| sink.set_property(name, &css_number(value));
        let unit = |name: &str, value: f64, suffix: &str| {
            sink.set_property(name, &format!("{}{suffix}", css_number(value)));
        };

        let colors = c.colors.get(stage);
        for (prefix, rgb) in [("core", colors.core), ("glow", colors.glow), ("text", colors.text)] {
            sink.set_property(&format!("--{prefix}-r"), &rgb.r.to_string());
            sink.set_property(&format!("--{prefix}-g"), &rgb.g.to_string());
            sink.set_property(&format!("--{prefix}-b"), &rgb.b.to_string());
        }
        num("--text-opacity", colors.text_opacity);

        let breathing = c.breathing.get(stage);
        unit("--breathing-speed", breathing.speed, "s");
        num("--breathing-min", breathing.opacity_min);
        num("--breathing-max", breathing.opacity_max);

        let vignette = c.vignette.get(stage);
        unit("--vignette-radius", vignette.radius, "%");
        num("--vignette-opacity", vignette.opacity);

        let scanlines = c.scanlines.get(stage);
        num("--scanline-opacity", scanlines.opacity);
        unit("--scanline-speed", scanlines.speed, "s");

        let blur = c.blur.get(stage);
        unit("--blur-title", blur.title, "px");
        unit("--blur-text", blur.text, "px");
        unit("--blur-pirate", blur.pirate, "px");

        let shadow = c.text_shadow.get(stage);
        unit("--text-shadow-spread", shadow.spread, "px");
        num("--text-shadow-intensity", shadow.intensity);

        let flicker = c.flicker.get(stage);
        unit("--flicker-speed", flicker.speed, "s");
        num("--flicker-brightness", flicker.brightness);

        let multiplier = if stage == Stage::Pirate {
            c.timings.pirate.opacity_multiplier
        } else {
            c.timings.standard.opacity_multiplier
        };
        num("--opacity-multiplier", multiplier);

        for other in Stage::ALL {
            sink.set_class(STAGE_ELEMENT, &format!("stage-{other}"), other == stage);
        }
    }
}

impl Subscriber for Atmosphere {
    fn on_stage(&mut self, stage: Stage, progress: f64) -> Result<(), SubscriberError> {
        if self.current != Some(stage) {
            debug!(%stage, "atmosphere switching tables");
            self.publish_stage(stage);
            self.current = Some(stage);
        }
        self.sink
            .set_property("--stage-progress", &css_number(progress));
        Ok(())
    }

    fn name(&self) -> &str {
        "atmosphere"
    }
}
