//! Relay orchestration.

use crate::batcher::EventBatcher;
use crate::clock::SystemClock;
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::intake;
use crate::recorder::Recorder;
use crate::replay;
use crate::summary::SessionSummary;
use chrono::Local;
use relay_outbox::{Dispatcher, HttpTransport, Transport};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The relay: engine, dispatcher and the tasks feeding them.
pub struct Relay {
    config: RelayConfig,
    batcher: EventBatcher,
    dispatcher: Arc<Dispatcher>,
}

impl Relay {
    /// Create a relay delivering over HTTP.
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let transport = HttpTransport::new(config.sender_config())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a relay delivering through `transport`.
    pub fn with_transport(config: RelayConfig, transport: Arc<dyn Transport>) -> RelayResult<Self> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new(transport, config.dispatcher_config()));
        let recorder = open_recorder(&config);
        let batcher = EventBatcher::new(config.batcher_config(), Arc::clone(&dispatcher), recorder);

        Ok(Self {
            config,
            batcher,
            dispatcher,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn batcher(&self) -> &EventBatcher {
        &self.batcher
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve producers on `listener` until `cancel` fires, then flush the
    /// open batch and report the session counters.
    pub async fn run(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> RelayResult<SessionSummary> {
        info!(
            endpoint = %self.config.endpoint_url,
            identity_field = %self.config.identity_field,
            recording = self.batcher.is_recording(),
            "Relay started"
        );

        let sweeper = self.dispatcher.spawn_sweeper(cancel.child_token());
        let replay = self.spawn_replay(cancel.child_token());

        let served = intake::serve(listener, self.batcher.clone(), cancel.clone()).await;
        cancel.cancel();

        if let Err(e) = sweeper.await {
            warn!(error = %e, "Retry sweeper ended abnormally");
        }
        if let Some(replay) = replay {
            if let Err(e) = replay.await {
                warn!(error = %e, "Replay task ended abnormally");
            }
        }

        let summary = self.shutdown().await;
        served.map(|_| summary)
    }

    /// Deliver whatever is still buffered and snapshot the counters.
    pub async fn shutdown(&self) -> SessionSummary {
        if let Some(outcome) = self.batcher.shutdown().await {
            info!(outcome = ?outcome, "Flushed open batch on shutdown");
        }

        SessionSummary::capture(self.batcher.stats(), &self.dispatcher.stats().snapshot())
    }

    fn spawn_replay(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let path = self.config.replay.clone()?;
        let speed = self.config.speed;
        let batcher = self.batcher.clone();

        Some(tokio::spawn(async move {
            info!(path = %path.display(), speed = speed, "Replay started");
            match replay::replay_file(&path, speed, &batcher, &cancel).await {
                Ok(report) => info!(
                    replayed = report.replayed,
                    skipped = report.skipped,
                    "Replay finished"
                ),
                Err(e) => error!(error = %e, "Replay failed"),
            }
        }))
    }
}

/// Open the record file, degrading to no recording on failure.
fn open_recorder(config: &RelayConfig) -> Option<Recorder> {
    let path = config.record.as_ref()?.resolve(Local::now());

    match Recorder::open(&path, Arc::new(SystemClock)) {
        Ok(recorder) => {
            info!(path = %path.display(), "Recording events");
            Some(recorder)
        }
        Err(e) => {
            warn!(error = %e, "Cannot open record file, recording disabled");
            None
        }
    }
}
