//! Metrics collection.
//!
//! Prometheus-compatible counters and gauges for the lifecycle, recorded by
//! [`MetricsRecorder`] as an engine observer. Labels are stage names or
//! sanitized subscriber names, so cardinality stays bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::SpecimenError;
use crate::lifecycle::{DeliveryFailure, EngineEvent, EngineObserver, Stage};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length for subscriber name labels.
const MAX_LABEL_LEN: usize = 64;

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `SpecimenError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), SpecimenError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SpecimenError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!("specimen_ticks_total", "Lifecycle ticks delivered");
    describe_counter!("specimen_stage_entries_total", "Stage entries by stage");
    describe_counter!(
        "specimen_transitions_total",
        "Explicit transitions started by target"
    );
    describe_counter!("specimen_deaths_total", "Terminal states reached by stage");
    describe_counter!(
        "specimen_interaction_resets_total",
        "Interactions that rebased the lifecycle clock"
    );
    describe_counter!(
        "specimen_subscriber_failures_total",
        "Subscriber failures swallowed during delivery"
    );
    describe_gauge!("specimen_current_stage", "Current stage (1 = active)");
    describe_gauge!("specimen_stage_progress", "Progress through the current stage");
}

/// Records one delivered tick.
pub fn record_tick(stage: Stage, progress: f64) {
    counter!("specimen_ticks_total", "stage" => stage.as_str()).increment(1);
    gauge!("specimen_stage_progress").set(progress);
}

/// Records a stage entry.
pub fn record_stage_entry(stage: Stage) {
    counter!("specimen_stage_entries_total", "stage" => stage.as_str()).increment(1);
}

/// Sets the current stage gauge, zeroing the previous stage first.
pub fn set_current_stage(stage: Stage, previous: Option<Stage>) {
    if let Some(prev) = previous {
        gauge!("specimen_current_stage", "stage" => prev.as_str()).set(0.0);
    }
    gauge!("specimen_current_stage", "stage" => stage.as_str()).set(1.0);
}

/// Records the start of an explicit transition.
pub fn record_transition(target: Stage) {
    counter!("specimen_transitions_total", "target" => target.as_str()).increment(1);
}

/// Records the engine reaching its terminal state.
pub fn record_death(stage: Stage) {
    counter!("specimen_deaths_total", "stage" => stage.as_str()).increment(1);
}

/// Records an interaction reset.
pub fn record_interaction_reset() {
    counter!("specimen_interaction_resets_total").increment(1);
}

/// Records a swallowed subscriber failure.
pub fn record_subscriber_failure(name: &str) {
    counter!(
        "specimen_subscriber_failures_total",
        "subscriber" => sanitize_label(name)
    )
    .increment(1);
}

/// Truncates a label and replaces characters invalid in Prometheus labels.
fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Engine observer that records lifecycle metrics.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    current: Mutex<Option<Stage>>,
}

impl MetricsRecorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineObserver for MetricsRecorder {
    fn on_event(&self, event: &EngineEvent) {
        match *event {
            EngineEvent::Tick { stage, progress } => record_tick(stage, progress),
            EngineEvent::StageEntered { stage } => {
                record_stage_entry(stage);
                let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
                set_current_stage(stage, current.replace(stage));
            }
            EngineEvent::TransitionStarted { target, .. } => record_transition(target),
            EngineEvent::Died { stage } => record_death(stage),
            EngineEvent::InteractionReset => record_interaction_reset(),
            EngineEvent::Started
            | EngineEvent::TransitionCompleted { .. }
            | EngineEvent::PirateFadeComplete
            | EngineEvent::Stopped => {}
        }
    }

    fn on_subscriber_failure(&self, failure: &DeliveryFailure) {
        record_subscriber_failure(&failure.name);
    }
}
