//! Lifecycle stages and the per-stage table type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named phase of the decay lifecycle.
///
/// The default path runs `Healthy → Panic → Decay → Death` as time passes
/// without interaction. `Pirate` is an alternate terminal branch that is only
/// reachable through an explicit transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stable phosphorescence.
    #[default]
    Healthy,
    /// Crisis response.
    Panic,
    /// Cellular breakdown.
    Decay,
    /// Final discharge.
    Death,
    /// Alternate ending reached through an explicit request.
    Pirate,
}

impl Stage {
    /// Every stage, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Healthy,
        Self::Panic,
        Self::Decay,
        Self::Death,
        Self::Pirate,
    ];

    /// Lowercase name used in CSS classes, logs and config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Panic => "panic",
            Self::Decay => "decay",
            Self::Death => "death",
            Self::Pirate => "pirate",
        }
    }

    /// Returns `true` for stages that end the lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Death | Self::Pirate)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage '{0}' (expected healthy, panic, decay, death or pirate)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStage(s.to_owned()))
    }
}

/// One value per stage.
///
/// Lookups are exhaustive: every stage has an entry, so there is no
/// fallback path for unknown stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTable<T> {
    /// Value while healthy.
    pub healthy: T,
    /// Value while panicking.
    pub panic: T,
    /// Value while decaying.
    pub decay: T,
    /// Value during the death transition.
    pub death: T,
    /// Value on the pirate branch.
    pub pirate: T,
}

impl<T> StageTable<T> {
    /// Builds a table by evaluating `f` for every stage.
    pub fn from_fn(mut f: impl FnMut(Stage) -> T) -> Self {
        Self {
            healthy: f(Stage::Healthy),
            panic: f(Stage::Panic),
            decay: f(Stage::Decay),
            death: f(Stage::Death),
            pirate: f(Stage::Pirate),
        }
    }

    /// Returns the entry for `stage`.
    #[must_use]
    pub const fn get(&self, stage: Stage) -> &T {
        match stage {
            Stage::Healthy => &self.healthy,
            Stage::Panic => &self.panic,
            Stage::Decay => &self.decay,
            Stage::Death => &self.death,
            Stage::Pirate => &self.pirate,
        }
    }

    /// Iterates `(stage, value)` pairs in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &T)> {
        Stage::ALL.into_iter().map(move |stage| (stage, self.get(stage)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_round_trip_through_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
        assert_eq!("  PANIC ".parse::<Stage>(), Ok(Stage::Panic));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = "zombie".parse::<Stage>().unwrap_err();
        assert!(err.to_string().contains("zombie"));
    }

    #[test]
    fn default_path_is_ordered() {
        assert!(Stage::Healthy < Stage::Panic);
        assert!(Stage::Panic < Stage::Decay);
        assert!(Stage::Decay < Stage::Death);
    }

    #[test]
    fn only_death_and_pirate_are_terminal() {
        let terminal: Vec<_> = Stage::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Stage::Death, Stage::Pirate]);
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Stage::Pirate).unwrap(), "\"pirate\"");
    }

    #[test]
    fn table_lookup_is_exhaustive() {
        let table = StageTable::from_fn(|s| s.as_str().len());
        assert_eq!(*table.get(Stage::Healthy), 7);
        assert_eq!(*table.get(Stage::Pirate), 6);
        assert_eq!(table.iter().count(), 5);
    }
}
