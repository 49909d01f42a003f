//! Decay lifecycle state machine.
//!
//! Maps time since the last interaction onto `healthy → panic → decay →
//! death`, runs explicit transitions (death, pirate) and notifies
//! subscribers synchronously, in registration order, on every tick.

pub mod engine;
pub mod hooks;
pub mod schedule;
pub mod stage;
pub mod state;
pub mod subscriber;
pub mod timeline;

pub use engine::{DEATH_HOOK_FRACTION, DecayEngine, EngineBuilder, TICK_INTERVAL};
pub use hooks::{ContentHooks, EngineEvent, EngineObserver};
pub use schedule::{Placement, place, transition_progress};
pub use stage::{Stage, StageTable, UnknownStage};
pub use state::{EngineMode, Snapshot};
pub use subscriber::{DeliveryFailure, Subscriber, SubscriberError, SubscriptionId};
pub use timeline::{Bucket, Entry, Mark, buckets, simulate};
