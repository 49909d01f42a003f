//! Elapsed-time bucketing.
//!
//! Maps the time since the last interaction onto the standard lifecycle by
//! cumulative durations. Boundaries are inclusive at the low end and
//! exclusive at the high end, so `elapsed == healthy` is the first instant
//! of `Panic`. A zero-length stage never matches and is skipped.

use std::time::Duration;

use crate::config::StandardTimings;

use super::stage::Stage;

/// Outcome of placing an elapsed time on the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Still alive: the stage and the fraction of it already spent.
    Alive {
        /// Stage containing `elapsed`.
        stage: Stage,
        /// Fraction of that stage completed, in `[0, 1)`.
        progress: f64,
    },
    /// The lifespan is exhausted and the death sequence should begin.
    Expired,
}

/// Places `elapsed` on the standard lifecycle.
#[must_use]
pub fn place(elapsed: Duration, timings: &StandardTimings) -> Placement {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let mut floor = 0.0_f64;

    for stage in [Stage::Healthy, Stage::Panic, Stage::Decay, Stage::Death] {
        #[allow(clippy::cast_precision_loss)]
        let length = timings.stage_ms(stage).unwrap_or(0) as f64;
        if elapsed_ms < floor + length {
            let progress = (elapsed_ms - floor) / length;
            if progress >= 1.0 {
                return Placement::Expired;
            }
            return Placement::Alive {
                stage,
                progress: progress.max(0.0),
            };
        }
        floor += length;
    }

    Placement::Expired
}

/// Progress of an explicit transition, clamped to `[0, 1]`.
///
/// A zero-length transition is complete immediately.
#[must_use]
pub fn transition_progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0)
}
