//! Interaction reset.
//!
//! User activity rebases the engine's elapsed-time clock. Only the kinds
//! listed in the configuration count, and accepted resets are throttled so
//! a burst of pointer events costs one reset per window.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

use crate::config::InteractionConfig;
use crate::lifecycle::DecayEngine;

/// Kind of user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    /// Page scrolled.
    Scroll,
    /// Pointer moved.
    PointerMove,
    /// Pointer clicked.
    Click,
    /// Touch began.
    TouchStart,
    /// Key pressed.
    KeyDown,
}

impl InteractionKind {
    /// Every kind.
    pub const ALL: [Self; 5] = [
        Self::Scroll,
        Self::PointerMove,
        Self::Click,
        Self::TouchStart,
        Self::KeyDown,
    ];

    /// Kebab-case name, as written in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::PointerMove => "pointer-move",
            Self::Click => "click",
            Self::TouchStart => "touch-start",
            Self::KeyDown => "key-down",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unknown interaction kind '{s}'"))
    }
}

/// Feeds qualifying interactions into an engine's `reset`.
#[derive(Debug)]
pub struct InteractionGate {
    engine: DecayEngine,
    kinds: HashSet<InteractionKind>,
    throttle: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl InteractionGate {
    /// Creates a gate for `engine` using the configured kinds and throttle.
    #[must_use]
    pub fn new(engine: DecayEngine, config: &InteractionConfig) -> Self {
        Self {
            engine,
            kinds: config.reset_events.iter().copied().collect(),
            throttle: config.throttle(),
            last_accepted: Mutex::new(None),
        }
    }

    /// Returns `true` if `kind` counts as activity.
    #[must_use]
    pub fn accepts(&self, kind: InteractionKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Handles one interaction. Returns `true` if the engine's clock was
    /// rebased.
    ///
    /// Interactions of an unconfigured kind, or inside the throttle window
    /// of the last accepted one, are dropped. An interaction the engine
    /// refuses (dead or transitioning) does not open a throttle window.
    pub fn handle(&self, kind: InteractionKind) -> bool {
        if !self.accepts(kind) {
            return false;
        }
        let now = Instant::now();
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last
            && now.saturating_duration_since(previous) < self.throttle
        {
            trace!(%kind, "interaction throttled");
            return false;
        }
        if !self.engine.reset() {
            return false;
        }
        *last = Some(now);
        trace!(%kind, "interaction accepted");
        true
    }
}
