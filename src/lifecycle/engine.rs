//! Decay engine orchestration.
//!
//! The `DecayEngine` owns the lifecycle state, drives it from a 100 ms tick
//! task, sequences explicit transitions and fans every update out to its
//! subscribers. It is a cheap handle: clones share one engine.
//!
//! State is only mutated under the state lock and subscribers are only
//! called after that lock is released, so a subscriber may call
//! [`DecayEngine::reset`] or read [`DecayEngine::snapshot`] while being
//! notified.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Timings;
use crate::error::EngineError;

use super::hooks::{ContentHooks, EngineEvent, EngineObserver};
use super::schedule::{self, Placement};
use super::stage::Stage;
use super::state::{Completion, EngineMode, EngineState, Mode, Snapshot, Ticker, Transition};
use super::subscriber::{ListenerList, Subscriber, SubscriptionId};

/// Fixed tick cadence of the engine.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Fraction of the death transition after which content hooks run.
pub const DEATH_HOOK_FRACTION: f64 = 0.75;

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn runtime() -> Result<Handle, EngineError> {
    Handle::try_current().map_err(|_| EngineError::NoRuntime)
}

// ============================================================================
// Builder
// ============================================================================

/// Configures a [`DecayEngine`] before it is shared.
#[must_use]
pub struct EngineBuilder {
    timings: Timings,
    hooks: Option<Arc<dyn ContentHooks>>,
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl EngineBuilder {
    /// Attaches the page's content hooks.
    pub fn hooks(mut self, hooks: Arc<dyn ContentHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Adds an observer. Observers are called in the order they are added.
    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the engine in the idle state.
    pub fn build(self) -> DecayEngine {
        DecayEngine {
            inner: Arc::new(Inner {
                timings: self.timings,
                state: Mutex::new(EngineState::default()),
                listeners: Mutex::new(ListenerList::new()),
                pending: Mutex::new(PendingChanges::default()),
                next_subscription: AtomicU64::new(0),
                hooks: self.hooks,
                observers: self.observers,
                deferred: Mutex::new(CancellationToken::new()),
            }),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to a decay lifecycle engine.
///
/// Every operation that schedules work (`start`, `resume`, transitions)
/// must run inside a Tokio runtime.
#[derive(Clone)]
pub struct DecayEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DecayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecayEngine")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl DecayEngine {
    /// Creates an idle engine with no hooks or observers.
    #[must_use]
    pub fn new(timings: Timings) -> Self {
        Self::builder(timings).build()
    }

    /// Starts configuring an engine.
    pub fn builder(timings: Timings) -> EngineBuilder {
        EngineBuilder {
            timings,
            hooks: None,
            observers: Vec::new(),
        }
    }

    /// Timing tables the engine runs on.
    #[must_use]
    pub fn timings(&self) -> &Timings {
        &self.inner.timings
    }

    /// Starts (or restarts) the lifecycle at healthy with progress 0.
    ///
    /// Rebases the clock, leaves any dead or transitioning mode, cancels
    /// timers left by a previous run and arms the tick task. Subscribers are
    /// notified with `(Healthy, 0.0)` before this returns. Calling `start`
    /// twice replaces the ticker rather than adding a second one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        let rt = runtime()?;
        self.inner.renew_deferred();
        let entered = {
            let mut state = lock(&self.inner.state);
            let now = Instant::now();
            let previous = state.stage;
            state.stop_ticker();
            state.stage = Stage::Healthy;
            state.progress = 0.0;
            state.last_interaction = Some(now);
            state.paused_at = None;
            state.mode = Mode::Running;
            self.inner.arm_ticker(&rt, &mut state, now + TICK_INTERVAL);
            previous != Stage::Healthy
        };
        info!("decay engine started");
        self.inner.emit(&EngineEvent::Started);
        if entered {
            self.inner.emit(&EngineEvent::StageEntered { stage: Stage::Healthy });
        }
        self.inner.deliver(Stage::Healthy, 0.0);
        Ok(())
    }

    /// Rebases the elapsed-time clock after user interaction.
    ///
    /// No-op while dead or transitioning. The stage is left as is; the next
    /// tick recomputes it from the new base. Returns `true` if the clock was
    /// rebased.
    pub fn reset(&self) -> bool {
        {
            let mut state = lock(&self.inner.state);
            if matches!(state.mode, Mode::Dead | Mode::Transitioning(_)) {
                return false;
            }
            let now = Instant::now();
            state.last_interaction = Some(state.paused_at.unwrap_or(now));
        }
        trace!("interaction reset");
        self.inner.emit(&EngineEvent::InteractionReset);
        true
    }

    /// Runs an explicit transition to `target` over `duration`.
    ///
    /// The stage is reported as `target` for the whole transition while
    /// progress climbs from 0 to 1 on the tick cadence. `on_complete` runs
    /// once, after subscribers have seen progress 1. The engine then holds
    /// at `target` until [`resume`](Self::resume) or [`start`](Self::start).
    /// A transition already in progress is replaced and its completion
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Dead`] once the engine is dead and
    /// [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn start_transition(
        &self,
        target: Stage,
        duration: Duration,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Result<(), EngineError> {
        let rt = runtime()?;
        let effects = {
            let mut state = lock(&self.inner.state);
            if matches!(state.mode, Mode::Dead) {
                return Err(EngineError::Dead);
            }
            self.inner.install_transition(
                &rt,
                &mut state,
                target,
                duration,
                Completion::Callback(Box::new(on_complete)),
            )
        };
        self.inner.apply(effects);
        Ok(())
    }

    /// Begins the death sequence.
    ///
    /// No-op if the engine is dead or already heading for a terminal stage.
    /// Otherwise schedules the content hooks at 75% of the death duration
    /// and transitions to `Death`, marking the engine dead on completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn begin_death(&self) -> Result<(), EngineError> {
        Inner::begin_death(&self.inner)
    }

    /// Diverts the lifecycle to the pirate ending.
    ///
    /// Transitions to `Pirate` over the colour-shift duration; completion
    /// hides primary content and marks the engine dead. Independently,
    /// `on_fade_complete` runs once after the fade-out duration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Dead`] once the engine is dead and
    /// [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn enter_pirate_mode(
        &self,
        on_fade_complete: impl FnOnce() + Send + 'static,
    ) -> Result<(), EngineError> {
        let rt = runtime()?;
        let pirate = &self.inner.timings.pirate;
        let effects = {
            let mut state = lock(&self.inner.state);
            if matches!(state.mode, Mode::Dead) {
                return Err(EngineError::Dead);
            }
            self.inner.install_transition(
                &rt,
                &mut state,
                Stage::Pirate,
                pirate.color_shift(),
                Completion::MarkDead { hide_content: true },
            )
        };
        info!(
            fade_out_ms = pirate.fade_out_duration,
            color_shift_ms = pirate.color_shift_duration,
            "entering pirate mode"
        );
        self.inner.defer(&rt, pirate.fade_out(), move |inner| {
            debug!("pirate fade-out complete");
            inner.emit(&EngineEvent::PirateFadeComplete);
            if catch_unwind(AssertUnwindSafe(on_fade_complete)).is_err() {
                warn!("pirate fade-out callback panicked");
            }
        });
        self.inner.apply(effects);
        Ok(())
    }

    /// Registers a subscriber and returns its handle.
    ///
    /// The subscriber receives every notification from the next one on, in
    /// registration order relative to the others. Safe to call from inside a
    /// subscriber.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.pending)
            .added
            .push(id, Box::new(subscriber));
        debug!(%id, "subscriber registered");
        id
    }

    /// Removes a subscriber. Takes effect before the next notification.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut pending = lock(&self.inner.pending);
        if !pending.added.remove(id) {
            pending.removed.push(id);
        }
    }

    /// Notifies every subscriber with the current `(stage, progress)`.
    pub fn notify(&self) {
        let (stage, progress) = {
            let state = lock(&self.inner.state);
            (state.stage, state.progress)
        };
        self.inner.deliver(stage, progress);
    }

    /// Overrides the current stage and progress and notifies immediately.
    ///
    /// The mode is left unchanged, so a running engine recomputes the stage
    /// from the clock on its next tick.
    pub fn set_stage(&self, stage: Stage, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        let entered = {
            let mut state = lock(&self.inner.state);
            let entered = state.stage != stage;
            state.stage = stage;
            state.progress = progress;
            entered
        };
        if entered {
            info!(%stage, "stage set");
            self.inner.emit(&EngineEvent::StageEntered { stage });
        }
        self.inner.deliver(stage, progress);
    }

    /// Suspends ticking without losing elapsed time or transition progress.
    ///
    /// No-op if already paused, idle or dead.
    pub fn pause(&self) {
        let mut state = lock(&self.inner.state);
        if state.paused_at.is_some() || matches!(state.mode, Mode::Idle | Mode::Dead) {
            return;
        }
        state.stop_ticker();
        state.paused_at = Some(Instant::now());
        debug!(stage = %state.stage, "decay engine paused");
    }

    /// Restarts ticking after [`pause`](Self::pause).
    ///
    /// Clocks are shifted forward by the paused interval, so the lifecycle
    /// continues where it left off. No-op if dead or not paused.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn resume(&self) -> Result<(), EngineError> {
        let rt = runtime()?;
        let mut guard = lock(&self.inner.state);
        let state = &mut *guard;
        if matches!(state.mode, Mode::Dead | Mode::Idle) {
            return Ok(());
        }
        let Some(paused_at) = state.paused_at.take() else {
            return Ok(());
        };
        let now = Instant::now();
        let paused_for = now.saturating_duration_since(paused_at);
        match &mut state.mode {
            Mode::Transitioning(transition) => transition.started_at += paused_for,
            _ => {
                if let Some(base) = state.last_interaction.as_mut() {
                    *base += paused_for;
                }
            }
        }
        self.inner.arm_ticker(&rt, state, now + TICK_INTERVAL);
        debug!(paused_ms = paused_for.as_millis(), "decay engine resumed");
        Ok(())
    }

    /// Tears the engine down for reuse.
    ///
    /// Cancels the ticker and pending deferred timers, drops every
    /// subscriber and returns to idle. The stage and progress are kept.
    /// Must not be called from inside a subscriber.
    pub fn destroy(&self) {
        {
            let mut state = lock(&self.inner.state);
            state.stop_ticker();
            state.mode = Mode::Idle;
            state.paused_at = None;
            state.last_interaction = None;
        }
        self.inner.renew_deferred();
        lock(&self.inner.listeners).clear();
        *lock(&self.inner.pending) = PendingChanges::default();
        info!("decay engine destroyed");
        self.inner.emit(&EngineEvent::Stopped);
    }

    /// Runs one tick immediately, as the tick task would.
    pub fn tick(&self) {
        Inner::tick(&self.inner, None);
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        lock(&self.inner.state).snapshot()
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        lock(&self.inner.state).stage
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> f64 {
        lock(&self.inner.state).progress
    }

    /// Returns `true` once the engine is in its terminal state.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.snapshot().mode == EngineMode::Dead
    }

    /// Returns `true` while an explicit transition runs.
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.snapshot().mode == EngineMode::Transitioning
    }

    /// Returns `true` while a tick task is armed.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        lock(&self.inner.state).ticker.is_some()
    }
}

// ============================================================================
// Internals
// ============================================================================

#[derive(Default)]
struct PendingChanges {
    added: ListenerList,
    removed: Vec<SubscriptionId>,
}

struct Inner {
    timings: Timings,
    state: Mutex<EngineState>,
    listeners: Mutex<ListenerList>,
    pending: Mutex<PendingChanges>,
    next_subscription: AtomicU64,
    hooks: Option<Arc<dyn ContentHooks>>,
    observers: Vec<Arc<dyn EngineObserver>>,
    /// Cancels deferred one-shot timers (death hooks, pirate fade).
    deferred: Mutex<CancellationToken>,
}

/// Work computed under the state lock and performed after releasing it.
#[derive(Default)]
struct Effects {
    events: Vec<EngineEvent>,
    notify: Option<(Stage, f64)>,
    completion: Option<Completion>,
    died: Option<Stage>,
    begin_death: bool,
}

impl Inner {
    fn emit(&self, event: &EngineEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    /// Replaces the deferred-timer token, cancelling every pending timer.
    fn renew_deferred(&self) {
        let old = std::mem::take(&mut *lock(&self.deferred));
        old.cancel();
    }

    /// Spawns the tick task and makes it the only active one.
    fn arm_ticker(self: &Arc<Self>, rt: &Handle, state: &mut EngineState, first: Instant) {
        state.stop_ticker();
        state.generations += 1;
        let generation = state.generations;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = rt.spawn(async move {
            let mut interval = tokio::time::interval_at(first, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        trace!(generation, "tick task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        Self::tick(&inner, Some(generation));
                    }
                }
            }
        });

        state.ticker = Some(Ticker {
            generation,
            cancel,
            handle,
        });
    }

    /// Runs `f` after `delay` unless the engine is destroyed or restarted.
    fn defer(
        self: &Arc<Self>,
        rt: &Handle,
        delay: Duration,
        f: impl FnOnce(&Arc<Self>) + Send + 'static,
    ) {
        let token = lock(&self.deferred).clone();
        let weak = Arc::downgrade(self);
        rt.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        f(&inner);
                    }
                }
            }
        });
    }

    /// One tick. `generation` is `None` for a manual tick.
    fn tick(self: &Arc<Self>, generation: Option<u64>) {
        let effects = {
            let mut state = lock(&self.state);
            if let Some(generation) = generation
                && !state.is_current(generation)
            {
                return;
            }
            let now = Instant::now();
            match state.mode.kind() {
                EngineMode::Idle | EngineMode::Dead => return,
                EngineMode::Transitioning => Self::advance_transition(&mut state, now),
                EngineMode::Running => {
                    let base = state.last_interaction.unwrap_or(now);
                    let elapsed = now.saturating_duration_since(base);
                    match schedule::place(elapsed, &self.timings.standard) {
                        Placement::Alive { stage, progress } => {
                            let mut effects = Effects::default();
                            if state.stage != stage {
                                effects.events.push(EngineEvent::StageEntered { stage });
                            }
                            state.stage = stage;
                            state.progress = progress;
                            effects.events.push(EngineEvent::Tick { stage, progress });
                            effects.notify = Some((stage, progress));
                            effects
                        }
                        Placement::Expired => Effects {
                            begin_death: true,
                            ..Effects::default()
                        },
                    }
                }
            }
        };
        self.apply(effects);
    }

    fn begin_death(self: &Arc<Self>) -> Result<(), EngineError> {
        let rt = runtime()?;
        let death = self.timings.standard.death_duration();
        let effects = {
            let mut state = lock(&self.state);
            if matches!(state.mode, Mode::Dead)
                || state.transition_target().is_some_and(Stage::is_terminal)
            {
                debug!("death already underway");
                return Ok(());
            }
            self.install_transition(
                &rt,
                &mut state,
                Stage::Death,
                death,
                Completion::MarkDead { hide_content: false },
            )
        };
        info!(death_ms = death.as_millis(), "beginning death sequence");
        self.defer(&rt, death.mul_f64(DEATH_HOOK_FRACTION), |inner| {
            inner.run_terminal_hooks();
        });
        self.apply(effects);
        Ok(())
    }

    /// Switches to explicit mode and computes the first transition tick.
    fn install_transition(
        self: &Arc<Self>,
        rt: &Handle,
        state: &mut EngineState,
        target: Stage,
        duration: Duration,
        completion: Completion,
    ) -> Effects {
        let now = Instant::now();
        if let Mode::Transitioning(previous) = &state.mode {
            debug!(previous = %previous.target, %target, "replacing running transition");
        }
        state.paused_at = None;
        state.mode = Mode::Transitioning(Transition {
            target,
            started_at: now,
            duration,
            completion: Some(completion),
        });
        self.arm_ticker(rt, state, now + TICK_INTERVAL);
        info!(%target, duration_ms = duration.as_millis(), "transition started");

        let mut effects = Self::advance_transition(state, now);
        effects
            .events
            .insert(0, EngineEvent::TransitionStarted { target, duration });
        effects
    }

    /// Recomputes transition progress and completes it at 1.
    fn advance_transition(state: &mut EngineState, now: Instant) -> Effects {
        let Mode::Transitioning(transition) = &mut state.mode else {
            return Effects::default();
        };
        let target = transition.target;
        let progress = schedule::transition_progress(
            now.saturating_duration_since(transition.started_at),
            transition.duration,
        );
        let completion = if progress >= 1.0 {
            transition.completion.take()
        } else {
            None
        };

        let mut effects = Effects::default();
        if state.stage != target {
            effects.events.push(EngineEvent::StageEntered { stage: target });
        }
        state.stage = target;
        state.progress = progress;
        effects.events.push(EngineEvent::Tick {
            stage: target,
            progress,
        });
        effects.notify = Some((target, progress));

        if progress >= 1.0 {
            state.stop_ticker();
            effects.events.push(EngineEvent::TransitionCompleted { target });
            match completion {
                Some(Completion::MarkDead { hide_content }) => {
                    state.mode = Mode::Dead;
                    effects.died = Some(target);
                    effects.completion = Some(Completion::MarkDead { hide_content });
                }
                other => {
                    state.mode = Mode::Running;
                    state.paused_at = Some(now);
                    effects.completion = other;
                }
            }
        }
        effects
    }

    /// Performs the effects of a state change, in order: events, the
    /// notification, then completion.
    fn apply(self: &Arc<Self>, effects: Effects) {
        for event in &effects.events {
            if let EngineEvent::StageEntered { stage } = event {
                info!(%stage, "stage entered");
            }
            self.emit(event);
        }
        if let Some((stage, progress)) = effects.notify {
            self.deliver(stage, progress);
        }
        match effects.completion {
            Some(Completion::MarkDead { hide_content }) => {
                if hide_content {
                    match &self.hooks {
                        Some(hooks) => hooks.hide_primary_content(),
                        None => debug!("no content hooks; primary content left visible"),
                    }
                }
            }
            Some(Completion::Callback(callback)) => {
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    warn!("transition completion callback panicked");
                }
            }
            None => {}
        }
        if let Some(stage) = effects.died {
            info!(%stage, "decay engine dead");
            self.emit(&EngineEvent::Died { stage });
        }
        if effects.begin_death
            && let Err(e) = Self::begin_death(self)
        {
            warn!(error = %e, "could not begin death sequence");
        }
    }

    fn run_terminal_hooks(&self) {
        let Some(hooks) = &self.hooks else {
            debug!("no content hooks; skipping terminal screen");
            return;
        };
        hooks.hide_primary_content();
        hooks.prepare_terminal_screen();
    }

    /// Delivers `(stage, progress)` to every subscriber, in order.
    fn deliver(&self, stage: Stage, progress: f64) {
        if DELIVERING.with(Cell::get) {
            warn!(%stage, "notification from inside a subscriber ignored");
            return;
        }
        let failures = {
            let mut listeners = lock(&self.listeners);
            {
                let mut pending = lock(&self.pending);
                for id in pending.removed.drain(..) {
                    listeners.remove(id);
                }
                listeners.append(&mut pending.added);
            }
            DELIVERING.with(|d| d.set(true));
            let failures = listeners.deliver(stage, progress);
            DELIVERING.with(|d| d.set(false));
            failures
        };
        for failure in &failures {
            debug!(
                id = %failure.id,
                subscriber = %failure.name,
                reason = %failure.reason,
                "subscriber failed; continuing"
            );
            for observer in &self.observers {
                observer.on_subscriber_failure(failure);
            }
        }
    }
}
