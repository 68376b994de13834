//! BAR relay: batches local game events and forwards them over HTTP.
//!
//! Producers connect over TCP and write one JSON object per line. The relay
//! coalesces bursts into batches, stamps each event with the configured
//! identity and POSTs the batch. Failed payloads wait in a retry buffer for
//! at most a minute.
//!
//! # Core Invariants
//!
//! 1. **Bounded latency**: a batch is flushed at most `hard_timeout` after its second event
//! 2. **Wire shape**: one event is sent as an object, two or more as an array
//! 3. **Non-blocking flush**: delivery runs outside the engine lock
//! 4. **Age-only eviction**: a retry payload is dropped only once it is 60 s old
//!
//! # Architecture
//!
//! ```text
//! Producer ──▶ Intake ──▶ EventBatcher ──▶ Dispatcher ──▶ HTTP endpoint
//!                 │            │                │
//!                ACK        Recorder       RetryBuffer ◀── sweeper
//!                              ▲
//!                          Replayer
//! ```

pub mod batcher;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod intake;
pub mod recorder;
pub mod relay;
pub mod replay;
pub mod summary;

#[cfg(test)]
mod tests;

pub use batcher::{BatcherConfig, EventBatcher, EventSink, IntakeStats, Phase};
pub use clock::{Clock, SystemClock};
pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use event::{encode_batch, parse_event, tag_identity, Event, RecordedEvent};
pub use identity::IdentityStore;
pub use intake::ACK;
pub use recorder::{RecordTarget, Recorder};
pub use relay::Relay;
pub use replay::{replay_file, replay_from, ReplayReport};
pub use summary::SessionSummary;
