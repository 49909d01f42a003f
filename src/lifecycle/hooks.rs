//! Optional collaborators of the engine.
//!
//! [`ContentHooks`] lets the page hide its primary content and prepare a
//! terminal screen when the lifecycle ends. [`EngineObserver`] receives
//! lifecycle events and swallowed subscriber failures; the event stream and
//! metrics recorders are observers.

use std::time::Duration;

use super::stage::Stage;
use super::subscriber::DeliveryFailure;

/// Page-side side effects triggered by terminal transitions.
///
/// Both methods default to no-ops so implementors only override what the
/// page actually supports.
pub trait ContentHooks: Send + Sync {
    /// Hides the page's primary content.
    fn hide_primary_content(&self) {}

    /// Prepares the screen shown after death.
    fn prepare_terminal_screen(&self) {}
}

/// Lifecycle event reported to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// `start()` armed the ticker.
    Started,
    /// The current stage changed.
    StageEntered {
        /// Stage entered.
        stage: Stage,
    },
    /// One elapsed-time or transition tick ran.
    Tick {
        /// Stage after the tick.
        stage: Stage,
        /// Progress after the tick.
        progress: f64,
    },
    /// An explicit transition began.
    TransitionStarted {
        /// Transition target.
        target: Stage,
        /// Transition length.
        duration: Duration,
    },
    /// An explicit transition reached progress 1.
    TransitionCompleted {
        /// Transition target.
        target: Stage,
    },
    /// The engine entered its terminal state.
    Died {
        /// Stage the engine died in.
        stage: Stage,
    },
    /// The pirate fade-out delay elapsed.
    PirateFadeComplete,
    /// An interaction rebased the elapsed-time clock.
    InteractionReset,
    /// `destroy()` tore the engine down.
    Stopped,
}

/// Receiver of engine events.
pub trait EngineObserver: Send + Sync {
    /// Called for every lifecycle event, outside the engine's locks.
    fn on_event(&self, event: &EngineEvent);

    /// Called once per subscriber failure swallowed during delivery.
    fn on_subscriber_failure(&self, _failure: &DeliveryFailure) {}
}
