//! End-of-session report.

use crate::batcher::IntakeStats;
use relay_outbox::DeliverySnapshot;
use std::fmt;

/// Counters captured when the relay stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub events: u64,
    pub invalid: u64,
    pub requests: u64,
    pub bytes: u64,
    pub failed_attempts: u64,
    pub retry_enqueued: u64,
    pub redelivered: u64,
    pub dropped_stale: u64,
}

impl SessionSummary {
    pub fn capture(intake: &IntakeStats, delivery: &DeliverySnapshot) -> Self {
        Self {
            events: intake.accepted(),
            invalid: intake.invalid(),
            requests: delivery.delivered_requests,
            bytes: delivery.delivered_bytes,
            failed_attempts: delivery.failed_attempts,
            retry_enqueued: delivery.retry_enqueued,
            redelivered: delivery.redelivered,
            dropped_stale: delivery.stale_dropped,
        }
    }

    pub fn kilobytes(&self) -> f64 {
        self.bytes as f64 / 1024.0
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Session Summary ---")?;
        writeln!(f, "Events:   {}", self.events)?;
        writeln!(f, "Requests: {}", self.requests)?;
        writeln!(f, "Data:     {:.2} KB", self.kilobytes())?;
        if self.dropped_stale > 0 {
            writeln!(f, "Dropped:  {} (stale)", self.dropped_stale)?;
        }
        if self.invalid > 0 {
            writeln!(f, "Invalid:  {} (JSON errors)", self.invalid)?;
        }
        write!(f, "-----------------------")
    }
}
