//! Adaptive batching engine.
//!
//! Coalesces events with two timers:
//!
//! ```text
//!            accept                 accept                  hard timer
//!   Empty ──────────▶ Pending ──────────────▶ Batching ───────────────▶ flush ─▶ Empty
//!                       │   (disarm soft, arm hard once)
//!                       │ soft timer, one event
//!                       └────────────────────────────────────────────▶ flush ─▶ Empty
//! ```
//!
//! The hard timer is armed once per batch and never pushed back by later
//! arrivals, so a saturated stream still flushes every `hard_timeout`.
//!
//! All state lives behind one lock. Timer tasks carry a token and take the
//! same lock before acting; a task whose token no longer matches the armed
//! slot was disarmed after it woke and does nothing. Serialized payloads are
//! handed to the dispatcher only after the lock is released.

use crate::error::RelayResult;
use crate::event::{encode_batch, parse_event, tag_identity, Event, DEFAULT_IDENTITY_FIELD};
use crate::recorder::Recorder;
use parking_lot::Mutex;
use relay_outbox::{DeliveryOutcome, Dispatcher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Batching engine configuration.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Quiet period after a lone event before it is sent on its own.
    pub soft_timeout: Duration,
    /// Maximum time a batch stays open once a second event arrives.
    pub hard_timeout: Duration,
    /// Field stamped onto every flushed event.
    pub identity_field: String,
    /// Value stamped into `identity_field`.
    pub identity: String,
}

impl BatcherConfig {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            soft_timeout: Duration::from_millis(100),
            hard_timeout: Duration::from_millis(250),
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            identity: identity.into(),
        }
    }
}

/// Engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing buffered, no timer armed.
    Empty,
    /// One event buffered, soft timer armed.
    Pending,
    /// Two or more events buffered, hard timer armed.
    Batching,
}

/// Anything that can take parsed events from a producer.
pub trait EventSink: Send + Sync {
    fn accept(&self, event: Event);

    /// Count an input that could not be turned into an event.
    fn record_invalid(&self);

    /// Parse and accept one line. Failures are counted and returned.
    fn accept_line(&self, line: &str) -> RelayResult<()> {
        match parse_event(line) {
            Ok(event) => {
                self.accept(event);
                Ok(())
            }
            Err(e) => {
                self.record_invalid();
                Err(e)
            }
        }
    }
}

/// Producer-side counters.
#[derive(Debug, Default)]
pub struct IntakeStats {
    accepted: AtomicU64,
    invalid: AtomicU64,
}

impl IntakeStats {
    /// Events accepted into the engine.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Lines rejected as malformed.
    pub fn invalid(&self) -> u64 {
        self.invalid.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Soft,
    Hard,
}

struct TimerSlot {
    token: u64,
    handle: JoinHandle<()>,
}

struct EngineState {
    buffer: Vec<Event>,
    phase: Phase,
    soft: Option<TimerSlot>,
    hard: Option<TimerSlot>,
    next_token: u64,
    recorder: Option<Recorder>,
}

impl EngineState {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<TimerSlot> {
        match kind {
            TimerKind::Soft => &mut self.soft,
            TimerKind::Hard => &mut self.hard,
        }
    }

    fn disarm(&mut self, kind: TimerKind) {
        if let Some(slot) = self.slot_mut(kind).take() {
            slot.handle.abort();
        }
    }
}

struct Inner {
    config: BatcherConfig,
    state: Mutex<EngineState>,
    stats: IntakeStats,
    dispatcher: Arc<Dispatcher>,
}

/// Shared handle to the batching engine. Clones refer to the same engine.
#[derive(Clone)]
pub struct EventBatcher {
    inner: Arc<Inner>,
}

impl EventBatcher {
    /// Create an engine delivering through `dispatcher`, optionally recording.
    pub fn new(
        config: BatcherConfig,
        dispatcher: Arc<Dispatcher>,
        recorder: Option<Recorder>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(EngineState {
                    buffer: Vec::new(),
                    phase: Phase::Empty,
                    soft: None,
                    hard: None,
                    next_token: 0,
                    recorder,
                }),
                stats: IntakeStats::default(),
                dispatcher,
            }),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &IntakeStats {
        &self.inner.stats
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Number of events in the open batch.
    pub fn buffered_len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state.lock().recorder.is_some()
    }

    /// Take the open batch, disarming both timers, and deliver it in place.
    ///
    /// Returns `None` when nothing was buffered.
    pub async fn shutdown(&self) -> Option<DeliveryOutcome> {
        let payload = self.take_batch()?;
        Some(self.inner.dispatcher.deliver(payload).await)
    }

    fn take_batch(&self) -> Option<Vec<u8>> {
        let mut state = self.inner.state.lock();
        self.inner.flush_locked(&mut state)
    }
}

impl EventSink for EventBatcher {
    fn accept(&self, event: Event) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        inner.stats.accepted.fetch_add(1, Ordering::Relaxed);
        inner.record_locked(&mut state, &event);
        state.buffer.push(event);

        match state.phase {
            Phase::Empty => {
                arm(inner, &mut state, TimerKind::Soft);
                state.phase = Phase::Pending;
            }
            Phase::Pending => {
                state.disarm(TimerKind::Soft);
                if state.hard.is_none() {
                    arm(inner, &mut state, TimerKind::Hard);
                }
                state.phase = Phase::Batching;
            }
            Phase::Batching => {}
        }
    }

    fn record_invalid(&self) {
        self.inner.stats.invalid.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawn a timer task for `kind` and store it in its slot.
fn arm(inner: &Arc<Inner>, state: &mut EngineState, kind: TimerKind) {
    let token = state.next_token;
    state.next_token = state.next_token.wrapping_add(1);

    let delay = match kind {
        TimerKind::Soft => inner.config.soft_timeout,
        TimerKind::Hard => inner.config.hard_timeout,
    };

    let engine: Weak<Inner> = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = engine.upgrade() {
            Inner::on_timer(&inner, kind, token);
        }
    });

    *state.slot_mut(kind) = Some(TimerSlot { token, handle });
}

impl Inner {
    fn on_timer(self: &Arc<Self>, kind: TimerKind, token: u64) {
        let payload = {
            let mut state = self.state.lock();

            let current = state.slot_mut(kind).as_ref().map(|slot| slot.token);
            if current != Some(token) {
                return;
            }
            // This task is the one that fired; clear the slot without aborting it.
            *state.slot_mut(kind) = None;

            match kind {
                TimerKind::Soft => match state.buffer.len() {
                    0 => {
                        state.phase = Phase::Empty;
                        None
                    }
                    1 => self.flush_locked(&mut state),
                    _ => {
                        if state.hard.is_none() {
                            arm(self, &mut state, TimerKind::Hard);
                        }
                        state.phase = Phase::Batching;
                        None
                    }
                },
                TimerKind::Hard => self.flush_locked(&mut state),
            }
        };

        if let Some(payload) = payload {
            self.dispatcher.dispatch(payload);
        }
    }

    /// Disarm both timers, tag and encode the open batch, reset to `Empty`.
    fn flush_locked(&self, state: &mut EngineState) -> Option<Vec<u8>> {
        state.disarm(TimerKind::Soft);
        state.disarm(TimerKind::Hard);
        state.phase = Phase::Empty;

        if state.buffer.is_empty() {
            return None;
        }

        let mut events = std::mem::take(&mut state.buffer);
        tag_identity(
            &mut events,
            &self.config.identity_field,
            &self.config.identity,
        );

        match encode_batch(&events) {
            Ok(payload) => {
                let delivered = self.dispatcher.stats().snapshot();
                debug!(
                    events = events.len(),
                    bytes = payload.len(),
                    total_events = self.stats.accepted(),
                    requests = delivered.delivered_requests,
                    sent_kb = delivered.delivered_bytes as f64 / 1024.0,
                    "Batch flushed"
                );
                Some(payload)
            }
            Err(e) => {
                error!(events = events.len(), error = %e, "Failed to encode batch");
                None
            }
        }
    }

    fn record_locked(&self, state: &mut EngineState, event: &Event) {
        let Some(recorder) = state.recorder.as_mut() else {
            return;
        };

        if let Err(e) = recorder.append(event) {
            warn!(error = %e, written = recorder.written(), "Recording failed, recording disabled");
            state.recorder = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_outbox::{DispatcherConfig, OutboxResult, Transport};

    struct AcceptAll;

    #[async_trait::async_trait]
    impl Transport for AcceptAll {
        async fn send(&self, _payload: &[u8]) -> OutboxResult<u16> {
            Ok(200)
        }
    }

    fn engine() -> EventBatcher {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(AcceptAll),
            DispatcherConfig::default(),
        ));
        EventBatcher::new(BatcherConfig::new("abc"), dispatcher, None)
    }

    fn event(name: &str) -> Event {
        parse_event(&format!(r#"{{"event":"{}"}}"#, name)).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = BatcherConfig::new("abc");
        assert_eq!(config.soft_timeout, Duration::from_millis(100));
        assert_eq!(config.hard_timeout, Duration::from_millis(250));
        assert_eq!(config.identity_field, "uuid");
        assert_eq!(config.identity, "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_follows_event_count() {
        let batcher = engine();
        assert_eq!(batcher.phase(), Phase::Empty);

        batcher.accept(event("kill"));
        assert_eq!(batcher.phase(), Phase::Pending);
        assert!(batcher.inner.state.lock().soft.is_some());
        assert!(batcher.inner.state.lock().hard.is_none());

        batcher.accept(event("death"));
        assert_eq!(batcher.phase(), Phase::Batching);
        assert!(batcher.inner.state.lock().soft.is_none());
        assert!(batcher.inner.state.lock().hard.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_timer_armed_once_per_batch() {
        let batcher = engine();
        batcher.accept(event("a"));
        batcher.accept(event("b"));
        let first_token = batcher.inner.state.lock().hard.as_ref().unwrap().token;

        batcher.accept(event("c"));
        batcher.accept(event("d"));

        let state = batcher.inner.state.lock();
        assert_eq!(state.hard.as_ref().unwrap().token, first_token);
        assert_eq!(state.buffer.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_token_is_ignored() {
        let batcher = engine();
        batcher.accept(event("kill"));
        let soft_token = batcher.inner.state.lock().soft.as_ref().unwrap().token;
        batcher.accept(event("death"));

        // A soft callback that woke before being disarmed must not flush.
        Inner::on_timer(&batcher.inner, TimerKind::Soft, soft_token);

        assert_eq!(batcher.phase(), Phase::Batching);
        assert_eq!(batcher.buffered_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_timer_with_two_events_enters_batching() {
        let batcher = engine();
        batcher.accept(event("kill"));

        // Simulate the race: a second event lands while the soft timer is
        // still armed and its callback runs before the transition.
        let token = {
            let mut state = batcher.inner.state.lock();
            state.buffer.push(event("death"));
            state.soft.as_ref().unwrap().token
        };
        Inner::on_timer(&batcher.inner, TimerKind::Soft, token);

        let state = batcher.inner.state.lock();
        assert_eq!(state.phase, Phase::Batching);
        assert!(state.hard.is_some());
        assert!(state.soft.is_none());
        assert_eq!(state.buffer.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_takes_open_batch() {
        let batcher = engine();
        batcher.accept(event("kill"));
        batcher.accept(event("death"));

        let outcome = batcher.shutdown().await;

        assert_eq!(outcome, Some(DeliveryOutcome::Delivered));
        assert_eq!(batcher.phase(), Phase::Empty);
        assert_eq!(batcher.buffered_len(), 0);
        assert!(batcher.inner.state.lock().hard.is_none());
        assert_eq!(batcher.dispatcher().stats().snapshot().delivered_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_nothing_buffered() {
        let batcher = engine();
        assert_eq!(batcher.shutdown().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_line_counts_invalid_input() {
        let batcher = engine();

        assert!(batcher.accept_line(r#"{"event":"#).is_err());
        assert!(batcher.accept_line("42").is_err());
        assert!(batcher.accept_line(r#"{"event":"kill"}"#).is_ok());

        assert_eq!(batcher.stats().invalid(), 2);
        assert_eq!(batcher.stats().accepted(), 1);
        assert_eq!(batcher.buffered_len(), 1);
    }
}
