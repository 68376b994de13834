//! Retry buffer for payloads that failed delivery.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Maximum age of a retry payload before it is dropped instead of retried.
pub const DEFAULT_MAX_RETRY_AGE: Duration = Duration::from_secs(60);

/// A serialized payload waiting for redelivery.
#[derive(Debug, Clone)]
pub struct RetryItem {
    /// Payload exactly as it was first sent.
    pub payload: Vec<u8>,
    /// When the first delivery attempt failed.
    pub enqueued_at: Instant,
}

impl RetryItem {
    /// Age of the item at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

/// Result of one sweep over the buffer.
#[derive(Debug)]
pub struct Sweep {
    /// Items evicted because they reached the age threshold.
    pub dropped: usize,
    /// Front item taken for redelivery, if any survived.
    pub next: Option<RetryItem>,
}

/// FIFO of failed payloads, evicted by age only.
///
/// The buffer has its own lock; it is never held across an outbound call.
pub struct RetryBuffer {
    max_age: Duration,
    items: Mutex<VecDeque<RetryItem>>,
}

impl RetryBuffer {
    /// Create an empty buffer with the given staleness threshold.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Append a payload stamped with the current time.
    pub fn enqueue(&self, payload: Vec<u8>) {
        self.enqueue_at(payload, Instant::now());
    }

    /// Append a payload stamped with `enqueued_at`.
    pub fn enqueue_at(&self, payload: Vec<u8>, enqueued_at: Instant) {
        let mut items = self.items.lock();
        items.push_back(RetryItem {
            payload,
            enqueued_at,
        });
        debug!(queued = items.len(), "Payload queued for retry");
    }

    /// Put back an item whose redelivery failed.
    ///
    /// The original timestamp is kept, so a payload that keeps failing still
    /// ages out on schedule.
    pub fn restore(&self, item: RetryItem) {
        self.items.lock().push_front(item);
    }

    /// Drop every item at or past the age threshold and take the front survivor.
    pub fn sweep(&self, now: Instant) -> Sweep {
        let mut items = self.items.lock();
        let before = items.len();
        let max_age = self.max_age;
        items.retain(|item| item.age(now) < max_age);
        let dropped = before - items.len();

        Sweep {
            dropped,
            next: items.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Default for RetryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY_AGE)
    }
}
