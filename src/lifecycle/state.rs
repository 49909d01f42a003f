//! Engine state representation.
//!
//! The engine is in exactly one [`Mode`] at a time. Transition data lives
//! inside [`Mode::Transitioning`], so elapsed-time mode and explicit mode can
//! never be active together, and the single [`Ticker`] slot means at most
//! one scheduled tick task exists.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::stage::Stage;

/// What happens once a transition reaches progress 1.
pub enum Completion {
    /// Marks the engine dead, optionally hiding primary content first.
    MarkDead {
        /// Call `hide_primary_content` on the content hooks.
        hide_content: bool,
    },
    /// Runs a caller-supplied callback once.
    Callback(Box<dyn FnOnce() + Send>),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkDead { hide_content } => f
                .debug_struct("MarkDead")
                .field("hide_content", hide_content)
                .finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// An explicit, duration-bounded override of elapsed-time computation.
#[derive(Debug)]
pub struct Transition {
    /// Stage reported for the whole transition.
    pub target: Stage,
    /// When the transition began, shifted forward by pauses.
    pub started_at: Instant,
    /// Transition length.
    pub duration: Duration,
    /// Taken exactly once when progress reaches 1.
    pub completion: Option<Completion>,
}

/// Exclusive engine modes.
#[derive(Debug, Default)]
pub enum Mode {
    /// Not started, or destroyed.
    #[default]
    Idle,
    /// Stage derived from time since the last interaction.
    Running,
    /// Stage fixed to the transition target, progress from its clock.
    Transitioning(Transition),
    /// Terminal. Ticks are no-ops.
    Dead,
}

impl Mode {
    /// Public view of the mode.
    #[must_use]
    pub const fn kind(&self) -> EngineMode {
        match self {
            Self::Idle => EngineMode::Idle,
            Self::Running => EngineMode::Running,
            Self::Transitioning(_) => EngineMode::Transitioning,
            Self::Dead => EngineMode::Dead,
        }
    }
}

/// Mode without transition internals, for callers and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Not started, or destroyed.
    Idle,
    /// Elapsed-time mode.
    Running,
    /// Explicit transition in progress.
    Transitioning,
    /// Terminal.
    Dead,
}

/// Handle to the running tick task.
#[derive(Debug)]
pub struct Ticker {
    /// Identifies this ticker; ticks from any other generation are ignored.
    pub generation: u64,
    /// Stops the task.
    pub cancel: CancellationToken,
    /// Detached on drop.
    pub handle: JoinHandle<()>,
}

impl Ticker {
    /// Cancels the task. The task observes the token before its next tick.
    pub fn stop(self) {
        self.cancel.cancel();
        drop(self.handle);
    }
}

/// Mutable engine state, guarded by the engine's state lock.
#[derive(Debug, Default)]
pub struct EngineState {
    /// Current stage.
    pub stage: Stage,
    /// Progress through the current stage or transition.
    pub progress: f64,
    /// Base of the elapsed-time clock.
    pub last_interaction: Option<Instant>,
    /// Exclusive mode.
    pub mode: Mode,
    /// The one active tick task, if any.
    pub ticker: Option<Ticker>,
    /// Set while paused; used to shift clocks on resume.
    pub paused_at: Option<Instant>,
    /// Source of ticker generations.
    pub generations: u64,
}

impl EngineState {
    /// Stops the active ticker, if any.
    pub fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    /// Returns `true` if `generation` belongs to the active ticker.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|t| t.generation == generation)
    }

    /// Returns the target of the running transition, if any.
    #[must_use]
    pub const fn transition_target(&self) -> Option<Stage> {
        match &self.mode {
            Mode::Transitioning(t) => Some(t.target),
            _ => None,
        }
    }

    /// Snapshot for callers.
    #[must_use]
    pub const fn snapshot(&self) -> Snapshot {
        Snapshot {
            stage: self.stage,
            progress: self.progress,
            mode: self.mode.kind(),
            paused: self.paused_at.is_some(),
        }
    }
}

/// Point-in-time copy of the engine's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    /// Current stage.
    pub stage: Stage,
    /// Current progress.
    pub progress: f64,
    /// Current mode.
    pub mode: EngineMode,
    /// Whether ticking is suspended.
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle_healthy() {
        let state = EngineState::default();
        let snap = state.snapshot();
        assert_eq!(snap.stage, Stage::Healthy);
        assert_eq!(snap.mode, EngineMode::Idle);
        assert!(!snap.paused);
        assert!(state.transition_target().is_none());
    }

    #[tokio::test]
    async fn stale_generation_is_not_current() {
        let mut state = EngineState::default();
        let cancel = CancellationToken::new();
        state.ticker = Some(Ticker {
            generation: 3,
            cancel: cancel.clone(),
            handle: tokio::spawn(async {}),
        });
        assert!(state.is_current(3));
        assert!(!state.is_current(2));

        state.stop_ticker();
        assert!(cancel.is_cancelled());
        assert!(!state.is_current(3));
    }

    #[test]
    fn transition_target_is_exposed() {
        let state = EngineState {
            mode: Mode::Transitioning(Transition {
                target: Stage::Pirate,
                started_at: Instant::now(),
                duration: Duration::from_secs(7),
                completion: Some(Completion::MarkDead { hide_content: true }),
            }),
            ..EngineState::default()
        };
        assert_eq!(state.transition_target(), Some(Stage::Pirate));
        assert_eq!(state.snapshot().mode, EngineMode::Transitioning);
    }
}
