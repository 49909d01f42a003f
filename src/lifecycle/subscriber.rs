//! Subscriber contract and the ordered listener list.
//!
//! Subscribers receive `(stage, progress)` by value. A subscriber that
//! returns an error or panics is isolated: delivery continues with the next
//! subscriber and the failure is reported to the caller of
//! [`ListenerList::deliver`] instead of being propagated.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::stage::Stage;

/// Failure reported by a subscriber while handling a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    /// Creates an error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiver of lifecycle notifications.
///
/// Closures of the form `FnMut(Stage, f64)` implement this trait, so
/// `engine.subscribe(|stage, progress| ...)` works directly.
///
/// An implementation may call [`subscribe`](super::DecayEngine::subscribe),
/// [`unsubscribe`](super::DecayEngine::unsubscribe) and
/// [`reset`](super::DecayEngine::reset) on the engine notifying it. A
/// notification it triggers itself ([`notify`](super::DecayEngine::notify),
/// [`set_stage`](super::DecayEngine::set_stage)) is dropped with a warning.
/// It must not call [`destroy`](super::DecayEngine::destroy).
pub trait Subscriber: Send {
    /// Handles one notification.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscriber could not apply the update. The
    /// engine records the failure and carries on.
    fn on_stage(&mut self, stage: Stage, progress: f64) -> Result<(), SubscriberError>;

    /// Short name used when reporting failures.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> Subscriber for F
where
    F: FnMut(Stage, f64) + Send,
{
    fn on_stage(&mut self, stage: Stage, progress: f64) -> Result<(), SubscriberError> {
        self(stage, progress);
        Ok(())
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A subscriber failure captured during delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Which subscription failed.
    pub id: SubscriptionId,
    /// The subscriber's self-reported name.
    pub name: String,
    /// What went wrong.
    pub reason: String,
}

struct Entry {
    id: SubscriptionId,
    subscriber: Box<dyn Subscriber>,
}

/// Append-ordered list of subscribers.
#[derive(Default)]
pub struct ListenerList {
    entries: Vec<Entry>,
}

impl ListenerList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber under an already allocated handle.
    pub fn push(&mut self, id: SubscriptionId, subscriber: Box<dyn Subscriber>) {
        self.entries.push(Entry { id, subscriber });
    }

    /// Removes a subscriber. Returns `false` if the handle is unknown.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Moves every subscriber of `other` to the end of this list.
    pub fn append(&mut self, other: &mut Self) {
        self.entries.append(&mut other.entries);
    }

    /// Drops every subscriber.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delivers one `(stage, progress)` pair to every subscriber in order.
    ///
    /// Errors and panics are caught per subscriber and returned; they never
    /// stop delivery to the subscribers that follow.
    pub fn deliver(&mut self, stage: Stage, progress: f64) -> Vec<DeliveryFailure> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                entry.subscriber.on_stage(stage, progress)
            }));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.0,
                Err(payload) => panic_message(payload.as_ref()),
            };
            failures.push(DeliveryFailure {
                id: entry.id,
                name: entry.subscriber.name().to_owned(),
                reason,
            });
        }
        failures
    }
}

impl fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "subscriber panicked".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Failing;

    impl Subscriber for Failing {
        fn on_stage(&mut self, _: Stage, _: f64) -> Result<(), SubscriberError> {
            Err(SubscriberError::new("nope"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct Panicking;

    impl Subscriber for Panicking {
        fn on_stage(&mut self, _: Stage, _: f64) -> Result<(), SubscriberError> {
            panic!("boom")
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, Stage, f64)>>>;

    fn recorder(log: &Log, tag: &'static str) -> Box<dyn Subscriber> {
        let log = Arc::clone(log);
        Box::new(move |stage: Stage, progress: f64| {
            log.lock().unwrap().push((tag, stage, progress));
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = ListenerList::new();
        list.push(SubscriptionId(0), recorder(&log, "a"));
        list.push(SubscriptionId(1), recorder(&log, "b"));
        list.push(SubscriptionId(2), recorder(&log, "c"));

        let failures = list.deliver(Stage::Panic, 0.25);
        assert!(failures.is_empty());

        let log = log.lock().unwrap();
        let tags: Vec<_> = log.iter().map(|(t, _, _)| *t).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
        assert!(log.iter().all(|(_, s, p)| *s == Stage::Panic && (*p - 0.25).abs() < f64::EPSILON));
    }

    #[test]
    fn failing_and_panicking_subscribers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = ListenerList::new();
        let (failing, panicking) = (SubscriptionId(1), SubscriptionId(2));
        list.push(SubscriptionId(0), recorder(&log, "first"));
        list.push(failing, Box::new(Failing));
        list.push(panicking, Box::new(Panicking));
        list.push(SubscriptionId(3), recorder(&log, "last"));

        let failures = list.deliver(Stage::Decay, 0.5);

        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].id, failing);
        assert_eq!(failures[0].name, "failing");
        assert_eq!(failures[0].reason, "nope");
        assert_eq!(failures[1].id, panicking);
        assert_eq!(failures[1].reason, "boom");

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _, _)| *t).collect();
        assert_eq!(tags, vec!["first", "last"]);
    }

    #[test]
    fn remove_unsubscribes_by_handle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = ListenerList::new();
        let a = SubscriptionId(0);
        list.push(a, recorder(&log, "a"));
        list.push(SubscriptionId(1), recorder(&log, "b"));

        assert!(list.remove(a));
        assert!(!list.remove(a));
        list.deliver(Stage::Healthy, 0.0);

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _, _)| *t).collect();
        assert_eq!(tags, vec!["b"]);
    }

    #[test]
    fn append_moves_entries_to_the_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut main = ListenerList::new();
        let mut pending = ListenerList::new();
        main.push(SubscriptionId(0), recorder(&log, "a"));
        pending.push(SubscriptionId(1), recorder(&log, "b"));

        main.append(&mut pending);
        assert_eq!(main.len(), 2);
        assert!(pending.is_empty());

        main.deliver(Stage::Healthy, 0.0);
        let tags: Vec<_> = log.lock().unwrap().iter().map(|(t, _, _)| *t).collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert!(main.remove(SubscriptionId(1)));
    }
}
