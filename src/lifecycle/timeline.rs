//! Offline lifecycle simulation.
//!
//! Replays what a [`DecayEngine`](super::DecayEngine) started at time zero
//! would do if nobody interacted with the page, on the same 100 ms tick
//! cadence, without a runtime or real time passing. Used to preview a
//! configuration and to drive offline audio renders.

use std::time::Duration;

use serde::Serialize;

use crate::config::{StandardTimings, Timings};

use super::engine::{DEATH_HOOK_FRACTION, TICK_INTERVAL};
use super::schedule::{self, Placement};
use super::stage::Stage;

/// Something the engine would do at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mark {
    /// Subscribers are notified.
    Notify {
        /// Stage delivered.
        stage: Stage,
        /// Progress delivered.
        progress: f64,
    },
    /// The current stage changes.
    StageEntered {
        /// Stage entered.
        stage: Stage,
    },
    /// An explicit transition begins.
    TransitionStarted {
        /// Transition target.
        target: Stage,
        /// Transition length in milliseconds.
        duration_ms: u64,
    },
    /// An explicit transition reaches progress 1.
    TransitionCompleted {
        /// Transition target.
        target: Stage,
    },
    /// The death hooks hide content and prepare the terminal screen.
    TerminalHooks,
    /// The pirate fade-out delay elapses.
    PirateFadeComplete,
    /// The engine enters its terminal state.
    Died {
        /// Stage the engine died in.
        stage: Stage,
    },
}

/// A [`Mark`] with its time since start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Entry {
    /// Milliseconds since start.
    pub at_ms: u64,
    /// What happens.
    #[serde(flatten)]
    pub mark: Mark,
}

/// One row of the elapsed-time bucketing table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    /// Milliseconds since the last interaction.
    pub elapsed_ms: u64,
    /// Stage at that time, `None` once the lifespan is exhausted.
    pub stage: Option<Stage>,
    /// Fraction of the stage completed.
    pub progress: f64,
}

/// Places every `step` from zero through the whole lifespan.
///
/// A zero step is treated as one millisecond.
#[must_use]
pub fn buckets(timings: &StandardTimings, step: Duration) -> Vec<Bucket> {
    #[allow(clippy::cast_possible_truncation)]
    let step_ms = (step.as_millis() as u64).max(1);
    let end = timings.lifespan_ms();
    (0..=end)
        .step_by(usize::try_from(step_ms).unwrap_or(usize::MAX))
        .map(|elapsed_ms| match schedule::place(Duration::from_millis(elapsed_ms), timings) {
            Placement::Alive { stage, progress } => Bucket {
                elapsed_ms,
                stage: Some(stage),
                progress,
            },
            Placement::Expired => Bucket {
                elapsed_ms,
                stage: None,
                progress: 1.0,
            },
        })
        .collect()
}

// ============================================================================
// Simulation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    TerminalHooks,
    PirateFade,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    target: Stage,
    started_ms: u64,
    duration_ms: u64,
}

struct Simulator<'a> {
    timings: &'a Timings,
    entries: Vec<Entry>,
    stage: Stage,
    transition: Option<Running>,
    dead: bool,
    next_tick: u64,
    timers: Vec<(u64, Timer)>,
}

/// Simulates an untouched run, optionally diverted to the pirate ending
/// `pirate_after` the start.
///
/// The result ends once the engine is dead and every pending timer has
/// fired. At equal instants timers run first, then the pirate request,
/// then the tick.
#[must_use]
pub fn simulate(timings: &Timings, pirate_after: Option<Duration>) -> Vec<Entry> {
    #[allow(clippy::cast_possible_truncation)]
    let mut pirate_at = pirate_after.map(|d| d.as_millis() as u64);
    let mut sim = Simulator {
        timings,
        entries: Vec::new(),
        stage: Stage::Healthy,
        transition: None,
        dead: false,
        next_tick: tick_ms(),
        timers: Vec::new(),
    };
    sim.push(0, Mark::Notify {
        stage: Stage::Healthy,
        progress: 0.0,
    });

    loop {
        if sim.dead {
            pirate_at = None;
            if sim.timers.is_empty() {
                break;
            }
        }
        let timer = sim
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, (at, _))| *at)
            .map(|(i, (at, _))| (i, *at));
        let tick = (!sim.dead).then_some(sim.next_tick);
        let next = [timer.map(|(_, at)| at), pirate_at, tick]
            .into_iter()
            .flatten()
            .min();
        let Some(now) = next else { break };

        if let Some((index, at)) = timer
            && at == now
        {
            let (_, which) = sim.timers.remove(index);
            sim.fire(now, which);
        } else if pirate_at == Some(now) {
            pirate_at = None;
            sim.enter_pirate(now);
        } else {
            sim.tick(now);
        }
    }
    sim.entries
}

fn tick_ms() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let ms = TICK_INTERVAL.as_millis() as u64;
    ms
}

impl Simulator<'_> {
    fn push(&mut self, at_ms: u64, mark: Mark) {
        self.entries.push(Entry { at_ms, mark });
    }

    fn fire(&mut self, now: u64, timer: Timer) {
        let mark = match timer {
            Timer::TerminalHooks => Mark::TerminalHooks,
            Timer::PirateFade => Mark::PirateFadeComplete,
        };
        self.push(now, mark);
    }

    fn tick(&mut self, now: u64) {
        self.next_tick = now + tick_ms();
        if self.transition.is_some() {
            self.advance(now);
            return;
        }
        match schedule::place(Duration::from_millis(now), &self.timings.standard) {
            Placement::Alive { stage, progress } => {
                self.enter(now, stage);
                self.push(now, Mark::Notify { stage, progress });
            }
            Placement::Expired => self.begin_death(now),
        }
    }

    fn enter(&mut self, now: u64, stage: Stage) {
        if self.stage != stage {
            self.push(now, Mark::StageEntered { stage });
        }
        self.stage = stage;
    }

    fn begin_death(&mut self, now: u64) {
        if self.transition.is_some_and(|t| t.target.is_terminal()) {
            return;
        }
        let death = self.timings.standard.death;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let hooks_after = (death as f64 * DEATH_HOOK_FRACTION).round() as u64;
        self.timers.push((now + hooks_after, Timer::TerminalHooks));
        self.install(now, Stage::Death, death);
    }

    fn enter_pirate(&mut self, now: u64) {
        let pirate = &self.timings.pirate;
        let (fade_out, color_shift) = (pirate.fade_out_duration, pirate.color_shift_duration);
        self.install(now, Stage::Pirate, color_shift);
        self.timers.push((now + fade_out, Timer::PirateFade));
    }

    fn install(&mut self, now: u64, target: Stage, duration_ms: u64) {
        self.push(now, Mark::TransitionStarted {
            target,
            duration_ms,
        });
        self.transition = Some(Running {
            target,
            started_ms: now,
            duration_ms,
        });
        self.next_tick = now + tick_ms();
        self.advance(now);
    }

    fn advance(&mut self, now: u64) {
        let Some(running) = self.transition else {
            return;
        };
        let progress = schedule::transition_progress(
            Duration::from_millis(now - running.started_ms),
            Duration::from_millis(running.duration_ms),
        );
        self.enter(now, running.target);
        self.push(now, Mark::Notify {
            stage: running.target,
            progress,
        });
        if progress >= 1.0 {
            self.transition = None;
            self.dead = true;
            self.push(now, Mark::TransitionCompleted {
                target: running.target,
            });
            self.push(now, Mark::Died {
                stage: running.target,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short() -> Timings {
        Timings {
            standard: StandardTimings {
                healthy: 300,
                panic: 200,
                decay: 200,
                death: 400,
                total: 1_100,
                opacity_multiplier: 1.0,
            },
            ..Timings::default()
        }
    }

    fn marks_at(entries: &[Entry], at_ms: u64) -> Vec<Mark> {
        entries
            .iter()
            .filter(|e| e.at_ms == at_ms)
            .map(|e| e.mark)
            .collect()
    }

    #[test]
    fn untouched_run_walks_every_stage() {
        let entries = simulate(&short(), None);
        assert_eq!(entries[0], Entry {
            at_ms: 0,
            mark: Mark::Notify {
                stage: Stage::Healthy,
                progress: 0.0
            }
        });

        let entered: Vec<Stage> = entries
            .iter()
            .filter_map(|e| match e.mark {
                Mark::StageEntered { stage } => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(entered, vec![Stage::Panic, Stage::Decay, Stage::Death]);

        let last = entries.last().unwrap();
        assert_eq!(last.mark, Mark::Died { stage: Stage::Death });
    }

    #[test]
    fn expiry_starts_the_death_transition() {
        let entries = simulate(&short(), None);
        // the elapsed path ends at 1100ms; death runs 400ms from that tick
        assert_eq!(marks_at(&entries, 1_100), vec![
            Mark::TransitionStarted {
                target: Stage::Death,
                duration_ms: 400
            },
            Mark::Notify {
                stage: Stage::Death,
                progress: 0.0
            },
        ]);
        assert_eq!(marks_at(&entries, 1_400), vec![
            Mark::TerminalHooks,
            Mark::Notify {
                stage: Stage::Death,
                progress: 0.75
            },
        ]);
        assert!(marks_at(&entries, 1_500).contains(&Mark::Died { stage: Stage::Death }));
    }

    #[test]
    fn ticks_stay_on_the_cadence() {
        let entries = simulate(&short(), None);
        assert!(
            entries
                .iter()
                .all(|e| e.at_ms % 100 == 0)
        );
    }

    #[test]
    fn pirate_branch_replaces_the_lifecycle() {
        let mut timings = short();
        timings.pirate.color_shift_duration = 500;
        timings.pirate.fade_out_duration = 250;
        let entries = simulate(&timings, Some(Duration::from_millis(150)));

        assert_eq!(marks_at(&entries, 150), vec![
            Mark::TransitionStarted {
                target: Stage::Pirate,
                duration_ms: 500
            },
            Mark::StageEntered {
                stage: Stage::Pirate
            },
            Mark::Notify {
                stage: Stage::Pirate,
                progress: 0.0
            },
        ]);
        assert!(marks_at(&entries, 400).contains(&Mark::PirateFadeComplete));
        assert_eq!(entries.last().unwrap(), &Entry {
            at_ms: 650,
            mark: Mark::Died {
                stage: Stage::Pirate
            }
        });
        assert!(!entries.iter().any(|e| e.mark == Mark::TerminalHooks));
    }

    #[test]
    fn pirate_after_death_is_ignored() {
        let entries = simulate(&short(), Some(Duration::from_secs(60)));
        assert!(
            !entries
                .iter()
                .any(|e| matches!(e.mark, Mark::TransitionStarted { target: Stage::Pirate, .. }))
        );
    }

    #[test]
    fn zero_death_dies_on_expiry() {
        let mut timings = short();
        timings.standard.death = 0;
        timings.standard.total = 700;
        let entries = simulate(&timings, None);
        let died = entries
            .iter()
            .find(|e| matches!(e.mark, Mark::Died { .. }))
            .unwrap();
        assert_eq!(died.at_ms, 700);
    }

    #[test]
    fn buckets_cover_the_lifespan() {
        let rows = buckets(&short().standard, Duration::from_millis(100));
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].stage, Some(Stage::Healthy));
        assert_eq!(rows[3].stage, Some(Stage::Panic));
        assert_eq!(rows[7].stage, Some(Stage::Death));
        assert_eq!(rows[11].stage, None);
    }
}
