//! Structured event stream.
//!
//! Discrete lifecycle events serialized as newline-delimited JSON (JSONL),
//! each carrying a monotonically increasing sequence number. Per-tick
//! notifications are not streamed; metrics count them instead.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::{DeliveryFailure, EngineEvent, EngineObserver, Stage};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The engine reached its terminal state.
    Died,
    /// Interrupted by SIGINT.
    Interrupted,
    /// Terminated by SIGTERM.
    Terminated,
    /// The run length limit elapsed.
    TimeLimit,
    /// Torn down before dying.
    Destroyed,
}

/// Summary statistics emitted when a run stops.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Stage the run ended in.
    pub final_stage: Stage,
    /// Interactions that rebased the clock.
    pub interaction_resets: u64,
    /// Subscriber failures swallowed during delivery.
    pub subscriber_failures: u64,
    /// Wall-clock run time in seconds.
    pub uptime_secs: f64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stage={} resets={} failures={} uptime={:.1}s",
            self.final_stage, self.interaction_resets, self.subscriber_failures, self.uptime_secs,
        )
    }
}

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete lifecycle event.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The engine started at healthy.
    EngineStarted {
        /// When the engine started.
        timestamp: DateTime<Utc>,
    },

    /// A new stage was entered.
    StageEntered {
        /// When the stage changed.
        timestamp: DateTime<Utc>,
        /// Stage entered.
        stage: Stage,
    },

    /// An explicit transition began.
    TransitionStarted {
        /// When the transition began.
        timestamp: DateTime<Utc>,
        /// Transition target.
        target: Stage,
        /// Transition length in milliseconds.
        duration_ms: u64,
    },

    /// An explicit transition reached progress 1.
    TransitionCompleted {
        /// When the transition completed.
        timestamp: DateTime<Utc>,
        /// Transition target.
        target: Stage,
    },

    /// The engine reached its terminal state.
    EngineDied {
        /// When the engine died.
        timestamp: DateTime<Utc>,
        /// Stage the engine died in.
        stage: Stage,
    },

    /// The pirate fade-out delay elapsed.
    PirateFadeComplete {
        /// When the fade completed.
        timestamp: DateTime<Utc>,
    },

    /// An interaction rebased the elapsed-time clock.
    InteractionReset {
        /// When the reset happened.
        timestamp: DateTime<Utc>,
    },

    /// A subscriber failed and was skipped.
    SubscriberFailed {
        /// When the failure was caught.
        timestamp: DateTime<Utc>,
        /// Subscriber name.
        subscriber: String,
        /// Failure message.
        reason: String,
    },

    /// The run stopped.
    EngineStopped {
        /// When the run stopped.
        timestamp: DateTime<Utc>,
        /// Why the run stopped.
        reason: StopReason,
        /// Run summary statistics.
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<RunSummary>,
    },
}

impl Event {
    /// Maps an engine event onto the stream, stamped now.
    ///
    /// Returns `None` for per-tick events.
    #[must_use]
    pub fn from_engine(event: &EngineEvent) -> Option<Self> {
        let timestamp = Utc::now();
        Some(match *event {
            EngineEvent::Started => Self::EngineStarted { timestamp },
            EngineEvent::StageEntered { stage } => Self::StageEntered { timestamp, stage },
            EngineEvent::TransitionStarted { target, duration } => Self::TransitionStarted {
                timestamp,
                target,
                duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            },
            EngineEvent::TransitionCompleted { target } => {
                Self::TransitionCompleted { timestamp, target }
            }
            EngineEvent::Died { stage } => Self::EngineDied { timestamp, stage },
            EngineEvent::PirateFadeComplete => Self::PirateFadeComplete { timestamp },
            EngineEvent::InteractionReset => Self::InteractionReset { timestamp },
            EngineEvent::Stopped => Self::EngineStopped {
                timestamp,
                reason: StopReason::Destroyed,
                summary: None,
            },
            EngineEvent::Tick { .. } => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) increments the sequence counter,
/// serializes the event as one JSON line and flushes. Serialization and I/O
/// failures are dropped.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock()
            && let Ok(line) = serde_json::to_string(&envelope)
        {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) {
        if let Ok(mut w) = self.writer.lock() {
            let _ = w.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// Engine observer
// ---------------------------------------------------------------------------

/// Streams engine events to an [`EventEmitter`] and keeps the counts a
/// [`RunSummary`] needs.
#[derive(Debug)]
pub struct EventRecorder {
    emitter: Arc<EventEmitter>,
    resets: AtomicU64,
    failures: AtomicU64,
}

impl EventRecorder {
    /// Creates a recorder writing to `emitter`.
    #[must_use]
    pub const fn new(emitter: Arc<EventEmitter>) -> Self {
        Self {
            emitter,
            resets: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Interaction resets seen so far.
    #[must_use]
    pub fn interaction_resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Subscriber failures seen so far.
    #[must_use]
    pub fn subscriber_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl EngineObserver for EventRecorder {
    fn on_event(&self, event: &EngineEvent) {
        if matches!(event, EngineEvent::InteractionReset) {
            self.resets.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(event) = Event::from_engine(event) {
            self.emitter.emit(event);
        }
    }

    fn on_subscriber_failure(&self, failure: &DeliveryFailure) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.emitter.emit(Event::SubscriberFailed {
            timestamp: Utc::now(),
            subscriber: failure.name.clone(),
            reason: failure.reason.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::lifecycle::SubscriptionId;

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn lines(&self) -> Vec<serde_json::Value> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample_event() -> Event {
        Event::StageEntered {
            timestamp: DateTime::parse_from_rfc3339("2026-02-04T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc),
            stage: Stage::Panic,
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&sample_event()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "StageEntered");
        assert_eq!(parsed["stage"], "panic");
    }

    #[test]
    fn emitter_increments_sequence() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(sample_event());
        emitter.emit(Event::EngineStopped {
            timestamp: Utc::now(),
            reason: StopReason::Died,
            summary: None,
        });

        assert_eq!(emitter.event_count(), 2);
        let lines = tw.lines();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["reason"], "died");
        assert!(lines[1].get("summary").is_none());
    }

    #[test]
    fn envelope_flattens_event_fields() {
        let envelope = EventEnvelope {
            sequence: 7,
            event: sample_event(),
        };
        let parsed = serde_json::to_value(&envelope).unwrap();
        assert_eq!(parsed["sequence"], 7);
        assert_eq!(parsed["type"], "StageEntered");
        assert!(parsed.get("event").is_none());
    }

    #[test]
    fn ticks_are_not_streamed() {
        assert!(
            Event::from_engine(&EngineEvent::Tick {
                stage: Stage::Healthy,
                progress: 0.5
            })
            .is_none()
        );
    }

    #[test]
    fn transition_duration_is_in_milliseconds() {
        let event = Event::from_engine(&EngineEvent::TransitionStarted {
            target: Stage::Death,
            duration: Duration::from_secs(2),
        })
        .unwrap();
        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "TransitionStarted");
        assert_eq!(parsed["target"], "death");
        assert_eq!(parsed["duration_ms"], 2000);
    }

    #[test]
    fn recorder_counts_and_streams() {
        let tw = TestWriter::new();
        let emitter = Arc::new(EventEmitter::new(Box::new(tw.clone())));
        let recorder = EventRecorder::new(emitter);

        recorder.on_event(&EngineEvent::Started);
        recorder.on_event(&EngineEvent::Tick {
            stage: Stage::Healthy,
            progress: 0.1,
        });
        recorder.on_event(&EngineEvent::InteractionReset);
        recorder.on_subscriber_failure(&DeliveryFailure {
            id: SubscriptionId(4),
            name: "beam".to_owned(),
            reason: "boom".to_owned(),
        });

        assert_eq!(recorder.interaction_resets(), 1);
        assert_eq!(recorder.subscriber_failures(), 1);
        let types: Vec<String> = tw
            .lines()
            .iter()
            .map(|l| l["type"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(types, vec!["EngineStarted", "InteractionReset", "SubscriberFailed"]);
    }

    #[test]
    fn from_file_creates_valid_jsonl_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let emitter = EventEmitter::from_file(&path).unwrap();
            emitter.emit(sample_event());
            emitter.flush();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["type"], "StageEntered");
    }

    #[test]
    fn run_summary_display() {
        let summary = RunSummary {
            final_stage: Stage::Death,
            interaction_resets: 3,
            subscriber_failures: 0,
            uptime_secs: 12.34,
        };
        assert_eq!(
            summary.to_string(),
            "stage=death resets=3 failures=0 uptime=12.3s"
        );
    }
}
