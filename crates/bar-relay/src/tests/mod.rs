//! Behaviour tests for the relay.
//!
//! - `harness.rs`    - Mock transport, in-memory sinks, fixed clock, engine wiring
//! - `batching.rs`   - Soft/hard timer behaviour and payload shape
//! - `tagging.rs`    - Identity stamping on flushed events
//! - `malformed.rs`  - Invalid input isolation and counting
//! - `end_to_end.rs` - Intake over a stream through to delivery, shutdown flush
//! - `retry.rs`      - Failed delivery, redelivery and stale eviction through the engine
//! - `recording.rs`  - Recorder tap on accepted events
//! - `replay.rs`     - Replay pacing and error handling

mod end_to_end;
