//! Observability: logging, metrics and the structured event stream.
//!
//! The event stream and metrics both hang off the engine as
//! [`EngineObserver`](crate::lifecycle::EngineObserver)s.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter, EventRecorder, RunSummary, StopReason};
pub use logging::{LogFormat, LogOptions, init_logging};
pub use metrics::{MetricsRecorder, init_metrics};
