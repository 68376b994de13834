//! BAR relay binary entry point.
//!
//! Usage: bar-relay [--host <ip>] [--port <port>] [--uuid <id>] [--record <path|auto>]
//!
//! If --uuid is not provided, the relay reads `~/.bar_uuid` or asks for one.

use bar_relay::identity::resolve_identity;
use bar_relay::{intake, IdentityStore, RecordTarget, Relay, RelayConfig, RelayResult};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// BAR relay: batches local game events and forwards them to the stats API.
#[derive(Parser, Debug)]
#[command(name = "bar-relay")]
#[command(about = "Batches local BAR game events and forwards them over HTTP")]
struct Args {
    /// IP to listen on.
    #[arg(long, env = "BAR_RELAY_HOST", default_value = bar_relay::config::DEFAULT_HOST)]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "BAR_RELAY_PORT", default_value_t = bar_relay::config::DEFAULT_PORT)]
    port: u16,

    /// Endpoint receiving batches.
    #[arg(long, env = "BAR_RELAY_URL", default_value = relay_outbox::DEFAULT_ENDPOINT_URL)]
    url: String,

    /// Identity stamped on every event.
    /// If not provided, read from ~/.bar_uuid or prompted for.
    #[arg(long, env = "BAR_RELAY_UUID")]
    uuid: Option<String>,

    /// Bearer token for the outbound call.
    #[arg(long, env = "BAR_RELAY_TOKEN")]
    token: Option<String>,

    /// Delete the stored identity before resolving it.
    #[arg(long)]
    reset: bool,

    /// Record accepted events to a file ("auto" for a timestamped name).
    #[arg(long, env = "BAR_RELAY_RECORD")]
    record: Option<RecordTarget>,

    /// Replay a recorded .jsonl file.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay speed factor (e.g. 2.0).
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Also write JSONL logs to this file.
    #[arg(long, env = "BAR_RELAY_LOG_FILE")]
    log_file: Option<PathBuf>,
}


/// Resolve once SIGINT (or SIGTERM on unix) arrives.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    let args = Args::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "bar-relay".into(),
        default_level: if args.verbose { "debug" } else { "info" }.into(),
        log_path: args.log_file.clone(),
        also_stderr: true,
    });

    let stdin = std::io::stdin();
    let identity = resolve_identity(
        args.uuid.as_deref(),
        args.reset,
        IdentityStore::new,
        stdin.lock(),
        std::io::stdout(),
    )?;

    let mut config = RelayConfig::new(identity);
    config.host = args.host;
    config.port = args.port;
    config.endpoint_url = args.url;
    config.access_token = args.token;
    config.record = args.record;
    config.replay = args.replay;
    config.speed = args.speed;

    let relay = Relay::new(config)?;
    let addr = relay.config().listen_addr();

    let listener = match intake::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Fatal: cannot listen");
            return Err(e);
        }
    };
    info!(addr = %addr, endpoint = %relay.config().endpoint_url, "BAR relay listening");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Received shutdown signal, flushing...");
        shutdown.cancel();
    });

    let summary = relay.run(listener, cancel).await?;
    println!("\n{}", summary);

    Ok(())
}
