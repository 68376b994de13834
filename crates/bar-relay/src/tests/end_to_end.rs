//! Intake through delivery, and the shutdown flush.

use super::harness::{
    assert_at, sleep_until, CollectingSink, MockTransport, TestRelay, TEST_IDENTITY,
};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::intake::{self, handle_connection};
use crate::relay::Relay;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// kill then death 20 ms apart: one array, both tagged, sent once at the
/// hard timeout measured from the second arrival.
#[tokio::test(start_paused = true)]
async fn kill_then_death_arrive_as_one_tagged_array() {
    let relay = TestRelay::new();
    let (client, server) = tokio::io::duplex(4096);

    let batcher = relay.batcher.clone();
    let connection = tokio::spawn(async move {
        handle_connection(server, &batcher, &CancellationToken::new()).await
    });

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut acks = BufReader::new(read_half).lines();

    write_half.write_all(b"{\"event\":\"kill\"}\n").await.unwrap();
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

    sleep_until(relay.started, ms(20)).await;
    write_half.write_all(b"{\"event\":\"death\"}\n").await.unwrap();
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

    sleep_until(relay.started, ms(1000)).await;

    let sent = relay.transport.sent();
    assert_eq!(sent.len(), 1, "payload must be sent exactly once");
    assert_at(relay.elapsed(sent[0].at), ms(270));
    assert_eq!(
        sent[0].json(),
        json!([
            {"event": "kill", "uuid": TEST_IDENTITY},
            {"event": "death", "uuid": TEST_IDENTITY}
        ])
    );

    write_half.shutdown().await.unwrap();
    let report = connection.await.unwrap().unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.invalid, 0);
}

/// Producers on separate connections share one engine.
#[tokio::test(start_paused = true)]
async fn connections_share_one_batch() {
    let relay = TestRelay::new();

    let mut connections = Vec::new();
    for name in ["alpha", "beta"] {
        let (client, server) = tokio::io::duplex(4096);
        let batcher = relay.batcher.clone();
        let handle = tokio::spawn(async move {
            handle_connection(server, &batcher, &CancellationToken::new()).await
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut acks = BufReader::new(read_half).lines();
        let line = format!("{{\"from\":\"{}\"}}\n", name);
        write_half.write_all(line.as_bytes()).await.unwrap();
        assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

        connections.push((handle, write_half, acks));
    }

    sleep_until(relay.started, ms(300)).await;

    let sent = relay.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].json().as_array().unwrap().len(), 2);

    for (handle, mut write_half, _acks) in connections {
        write_half.shutdown().await.unwrap();
        assert_eq!(handle.await.unwrap().unwrap().accepted, 1);
    }
}

/// Shutdown stops intake, delivers the open batch and reports the counters.
#[tokio::test]
async fn shutdown_delivers_open_batch_and_reports() {
    let transport = MockTransport::new();
    let mut config = RelayConfig::new(TEST_IDENTITY);
    // Long timers so only the shutdown flush can send.
    config.soft_timeout = Duration::from_secs(30);
    config.hard_timeout = Duration::from_secs(60);

    let relay = Relay::with_transport(config, transport.clone()).unwrap();
    let listener = intake::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let running = tokio::spawn(async move { relay.run(listener, run_cancel).await });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut acks = BufReader::new(read_half).lines();

    write_half
        .write_all(b"{\"event\":\"kill\"}\n{\"event\":\"death\"}\nnot json\n")
        .await
        .unwrap();
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

    cancel.cancel();
    let summary = running.await.unwrap().unwrap();

    assert_eq!(summary.events, 2);
    assert_eq!(summary.requests, 1);
    assert_eq!(summary.dropped_stale, 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].json().as_array().unwrap().len(), 2);
    assert_eq!(summary.bytes, sent[0].body.len() as u64);
}

/// A producer that stays connected through shutdown is closed before the
/// final flush; anything it writes afterwards is neither acknowledged nor
/// buffered.
#[tokio::test]
async fn open_connection_is_closed_before_final_flush() {
    let transport = MockTransport::new();
    let mut config = RelayConfig::new(TEST_IDENTITY);
    config.soft_timeout = Duration::from_secs(30);
    config.hard_timeout = Duration::from_secs(60);

    let relay = Arc::new(Relay::with_transport(config, transport.clone()).unwrap());
    let listener = intake::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let runner = Arc::clone(&relay);
    let run_cancel = cancel.clone();
    let running = tokio::spawn(async move { runner.run(listener, run_cancel).await });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut acks = BufReader::new(read_half).lines();

    write_half.write_all(b"{\"event\":\"kill\"}\n").await.unwrap();
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

    cancel.cancel();
    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(transport.sent_count(), 1);

    // The peer may already have reset the socket, so a failed write is fine.
    let _ = write_half.write_all(b"{\"event\":\"late\"}\n").await;
    if let Ok(line) = acks.next_line().await {
        assert_eq!(line, None);
    }

    assert_eq!(relay.batcher().stats().accepted(), 1);
    assert_eq!(relay.batcher().buffered_len(), 0);
    assert_eq!(transport.sent_count(), 1);
}

/// Cancelling stops a connection that is idle between lines.
#[tokio::test]
async fn cancel_closes_idle_connection() {
    let sink = CollectingSink::default();
    let (client, server) = tokio::io::duplex(4096);
    let cancel = CancellationToken::new();

    let connection_cancel = cancel.clone();
    let connection =
        tokio::spawn(async move { handle_connection(server, &sink, &connection_cancel).await });

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut acks = BufReader::new(read_half).lines();
    write_half.write_all(b"{\"event\":\"kill\"}\n").await.unwrap();
    assert_eq!(acks.next_line().await.unwrap().as_deref(), Some("ACK"));

    cancel.cancel();
    let report = connection.await.unwrap().unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(acks.next_line().await.unwrap(), None);
}

/// Binding an address already in use is reported as a bind failure.
#[tokio::test]
async fn bind_conflict_is_reported() {
    let first = intake::bind("127.0.0.1:0").await.unwrap();
    let addr = first.local_addr().unwrap().to_string();

    let result = intake::bind(&addr).await;
    assert!(matches!(result, Err(RelayError::Bind { .. })));
}
