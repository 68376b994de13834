//! Replays a recording through the engine with its original pacing.
//!
//! The pause before each event is the gap to the previous successfully
//! parsed record divided by the speed factor. Unparseable lines are skipped
//! and do not move that reference point.

use crate::batcher::EventSink;
use crate::error::{RelayError, RelayResult};
use crate::event::RecordedEvent;
use chrono::TimeDelta;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Events handed to the engine.
    pub replayed: u64,
    /// Lines that were not valid records.
    pub skipped: u64,
}

/// Replay the recording at `path`.
pub async fn replay_file<S>(
    path: &Path,
    speed: f64,
    sink: &S,
    cancel: &CancellationToken,
) -> RelayResult<ReplayReport>
where
    S: EventSink + ?Sized,
{
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RelayError::Replay(format!("{}: {}", path.display(), e)))?;

    replay_from(BufReader::new(file), speed, sink, cancel).await
}

/// Replay records read from `reader`. Stops early when `cancel` fires.
pub async fn replay_from<R, S>(
    mut reader: R,
    speed: f64,
    sink: &S,
    cancel: &CancellationToken,
) -> RelayResult<ReplayReport>
where
    R: AsyncBufRead + Unpin,
    S: EventSink + ?Sized,
{
    if !speed.is_finite() || speed <= 0.0 {
        return Err(RelayError::Replay(format!(
            "speed must be a positive number, got {}",
            speed
        )));
    }

    let mut buf = Vec::new();
    let mut report = ReplayReport::default();
    let mut previous = None;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                sink.record_invalid();
                report.skipped += 1;
                debug!(error = %e, "Skipping non-UTF-8 recording line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let record: RecordedEvent = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                sink.record_invalid();
                report.skipped += 1;
                debug!(error = %e, input = %line, "Skipping unreadable recording line");
                continue;
            }
        };

        if let Some(previous) = previous {
            let delay = scaled_delay(record.recorded_at - previous, speed);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(report),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        previous = Some(record.recorded_at);
        sink.accept(record.data);
        report.replayed += 1;
    }

    Ok(report)
}

/// Gap between records divided by `speed`. Negative gaps replay immediately.
pub fn scaled_delay(gap: TimeDelta, speed: f64) -> Duration {
    match gap.to_std() {
        Ok(gap) => Duration::try_from_secs_f64(gap.as_secs_f64() / speed).unwrap_or(Duration::MAX),
        Err(_) => Duration::ZERO,
    }
}
