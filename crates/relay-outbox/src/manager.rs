//! Dispatcher coordinating first delivery, the retry buffer, and the sweeper.

use crate::queue::{RetryBuffer, RetryItem, DEFAULT_MAX_RETRY_AGE};
use crate::sender::{check_status, Transport};
use crate::stats::DeliveryStats;
use crate::OutboxResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Interval between retry sweeps.
    pub sweep_interval: Duration,
    /// Age at which a queued payload is dropped.
    pub max_retry_age: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            max_retry_age: DEFAULT_MAX_RETRY_AGE,
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint accepted the payload.
    Delivered,
    /// Transport error or status >= 400.
    Failed,
}

/// What a single sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Payloads evicted for staleness.
    pub dropped: usize,
    /// Whether a redelivery was attempted.
    pub attempted: bool,
    /// Whether that redelivery succeeded.
    pub delivered: bool,
    /// Payloads still queued after the sweep.
    pub remaining: usize,
}

/// Delivers flushed payloads and owns the retry buffer.
///
/// First attempts run on their own task so the caller never waits on the
/// network. A failed first attempt lands in the retry buffer; redeliveries
/// happen only from the sweeper, one payload per sweep.
pub struct Dispatcher {
    config: DispatcherConfig,
    transport: Arc<dyn Transport>,
    retry: RetryBuffer,
    stats: Arc<DeliveryStats>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(transport: Arc<dyn Transport>, config: DispatcherConfig) -> Self {
        let retry = RetryBuffer::new(config.max_retry_age);
        Self {
            config,
            transport,
            retry,
            stats: Arc::new(DeliveryStats::new()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    pub fn retry_buffer(&self) -> &RetryBuffer {
        &self.retry
    }

    /// Deliver on a separate task and return immediately.
    pub fn dispatch(self: &Arc<Self>, payload: Vec<u8>) -> JoinHandle<DeliveryOutcome> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.deliver(payload).await })
    }

    /// First delivery attempt; a failure queues the payload for retry.
    pub async fn deliver(&self, payload: Vec<u8>) -> DeliveryOutcome {
        match self.attempt(&payload).await {
            Ok(status) => {
                self.stats.record_delivered(payload.len());
                debug!(bytes = payload.len(), status = status, "Payload delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                self.stats.record_failed();
                warn!(bytes = payload.len(), error = %e, "Delivery failed, queued for retry");
                self.retry.enqueue(payload);
                self.stats.record_enqueued();
                DeliveryOutcome::Failed
            }
        }
    }

    /// Redelivery from the retry buffer. A failure is never re-enqueued as a
    /// new item; the original item goes back with its original timestamp.
    async fn redeliver(&self, item: RetryItem) -> DeliveryOutcome {
        match self.attempt(&item.payload).await {
            Ok(status) => {
                self.stats.record_delivered(item.payload.len());
                self.stats.record_redelivered();
                info!(bytes = item.payload.len(), status = status, "Retried payload delivered");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                self.stats.record_failed();
                debug!(bytes = item.payload.len(), error = %e, "Retry attempt failed");
                self.retry.restore(item);
                DeliveryOutcome::Failed
            }
        }
    }

    async fn attempt(&self, payload: &[u8]) -> OutboxResult<u16> {
        check_status(self.transport.send(payload).await)
    }

    /// Evict stale payloads, then redeliver at most one survivor.
    pub async fn sweep_once(&self) -> SweepReport {
        let sweep = self.retry.sweep(Instant::now());

        if sweep.dropped > 0 {
            self.stats.record_stale(sweep.dropped);
            warn!(
                dropped = sweep.dropped,
                max_age_secs = self.config.max_retry_age.as_secs(),
                "Dropped stale payloads from retry buffer"
            );
        }

        let mut report = SweepReport {
            dropped: sweep.dropped,
            ..Default::default()
        };

        if let Some(item) = sweep.next {
            report.attempted = true;
            report.delivered = self.redeliver(item).await == DeliveryOutcome::Delivered;
        }

        report.remaining = self.retry.len();
        report
    }

    /// Run [`Dispatcher::sweep_once`] every `sweep_interval` until cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let period = dispatcher.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Retry sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if dispatcher.retry.is_empty() {
                            continue;
                        }
                        let report = dispatcher.sweep_once().await;
                        debug!(
                            dropped = report.dropped,
                            attempted = report.attempted,
                            delivered = report.delivered,
                            remaining = report.remaining,
                            "Retry sweep finished"
                        );
                    }
                }
            }
        })
    }
}
