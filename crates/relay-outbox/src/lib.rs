//! Outbound delivery for the BAR relay.
//!
//! This crate provides:
//! - Dispatcher: fire-and-forget delivery with a single retry buffer and a periodic sweeper
//! - RetryBuffer: in-memory queue of failed payloads, evicted by age only
//! - HttpTransport: reqwest-backed `Transport` that POSTs JSON payloads
//! - DeliveryStats: lock-free counters shared by delivery and the sweeper

mod error;
mod manager;
mod queue;
mod sender;
mod stats;

pub use error::{OutboxError, OutboxResult};
pub use manager::{DeliveryOutcome, Dispatcher, DispatcherConfig, SweepReport};
pub use queue::{RetryBuffer, RetryItem, Sweep, DEFAULT_MAX_RETRY_AGE};
pub use sender::{check_status, HttpTransport, SenderConfig, Transport, DEFAULT_ENDPOINT_URL};
pub use stats::{DeliverySnapshot, DeliveryStats};
