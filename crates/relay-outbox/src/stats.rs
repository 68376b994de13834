//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the dispatcher and the retry sweeper.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered_requests: AtomicU64,
    delivered_bytes: AtomicU64,
    failed_attempts: AtomicU64,
    retry_enqueued: AtomicU64,
    redelivered: AtomicU64,
    stale_dropped: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySnapshot {
    /// Successful outbound calls, first attempt or retry.
    pub delivered_requests: u64,
    /// Payload bytes of successful outbound calls.
    pub delivered_bytes: u64,
    /// Outbound calls that failed (transport error or status >= 400).
    pub failed_attempts: u64,
    /// Payloads placed into the retry buffer.
    pub retry_enqueued: u64,
    /// Payloads that succeeded on a redelivery from the retry buffer.
    pub redelivered: u64,
    /// Payloads evicted from the retry buffer for exceeding the age threshold.
    pub stale_dropped: u64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_delivered(&self, bytes: usize) {
        self.delivered_requests.fetch_add(1, Ordering::Relaxed);
        self.delivered_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.retry_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redelivered(&self) {
        self.redelivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self, count: usize) {
        self.stale_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            delivered_requests: self.delivered_requests.load(Ordering::Relaxed),
            delivered_bytes: self.delivered_bytes.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            retry_enqueued: self.retry_enqueued.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
        }
    }
}
