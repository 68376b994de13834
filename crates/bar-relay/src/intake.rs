//! Line-delimited JSON intake over TCP.
//!
//! Producers write one JSON object per line. Each parsed line is handed to
//! the engine and answered with [`ACK`]; malformed lines are counted and
//! dropped without an answer. A final line with no terminating newline is
//! discarded when the producer disconnects. On shutdown every connection
//! stops reading and is closed before the intake returns.

use crate::batcher::EventSink;
use crate::error::{RelayError, RelayResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Acknowledgment written after every accepted line.
pub const ACK: &[u8] = b"ACK\n";

/// Per-connection tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionReport {
    pub accepted: u64,
    pub invalid: u64,
}

/// Bind the listening socket.
pub async fn bind(addr: &str) -> RelayResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Accept producers until `cancel` fires, one task per connection.
///
/// Returns only after every connection task has stopped reading, so no
/// event can be accepted once this resolves.
pub async fn serve<S>(listener: TcpListener, sink: S, cancel: CancellationToken) -> RelayResult<()>
where
    S: EventSink + Clone + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Intake listening");
    }

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Intake stopped accepting connections");
                break;
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Connection task ended abnormally");
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Producer connected");
                        let sink = sink.clone();
                        let cancel = cancel.clone();
                        connections.spawn(async move {
                            match handle_connection(stream, &sink, &cancel).await {
                                Ok(report) => debug!(
                                    peer = %peer,
                                    accepted = report.accepted,
                                    invalid = report.invalid,
                                    "Producer disconnected"
                                ),
                                Err(e) => debug!(peer = %peer, error = %e, "Connection error"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                }
            }
        }
    }

    drop(listener);
    let open = connections.len();
    if open > 0 {
        debug!(connections = open, "Waiting for producer connections to close");
    }
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Connection task ended abnormally");
        }
    }

    Ok(())
}

/// Read lines from one producer until it closes, errors or `cancel` fires.
pub async fn handle_connection<T, S>(
    stream: T,
    sink: &S,
    cancel: &CancellationToken,
) -> RelayResult<ConnectionReport>
where
    T: AsyncRead + AsyncWrite,
    S: EventSink + ?Sized,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut report = ConnectionReport::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Closing producer connection on shutdown");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            debug!(bytes = buf.len(), "Discarding unterminated trailing line");
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                sink.record_invalid();
                report.invalid += 1;
                debug!(error = %e, "Rejected non-UTF-8 line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match sink.accept_line(line) {
            Ok(()) => {
                write_half.write_all(ACK).await?;
                report.accepted += 1;
            }
            Err(e) => {
                report.invalid += 1;
                debug!(error = %e, input = %line, "Rejected malformed event");
            }
        }
    }

    Ok(report)
}
