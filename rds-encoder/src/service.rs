//! Encoder bridge service core.
//!
//! Wires an event source, the normalizer, the SmartGen client and an
//! optional preview sink into one [`Orchestrator`], and runs it until the
//! source ends or the stop handle fires.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rds_core::{
    ConnectionState, Denylist, EventSource, Normalizer, Orchestrator, RdsError, SmartGenClient,
    WordList,
};

use crate::config::{EncoderConfig, SourceKind};
use crate::preview;
use crate::source::{JsonLines, TcpSource};

// ── EncoderService ───────────────────────────────────────────────

/// The top-level encoder bridge service.
pub struct EncoderService {
    config: EncoderConfig,
    cancel: CancellationToken,
}

impl EncoderService {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that stops the service from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run with the source named in the config.
    pub async fn run(&self) -> Result<(), RdsError> {
        match self.config.source.kind {
            SourceKind::Stdin => {
                info!("reading track events from stdin");
                self.run_with_source(JsonLines::stdin()).await
            }
            SourceKind::Tcp => {
                let source = TcpSource::bind(&self.config.source.listen, self.config.source.buffer).await?;
                self.run_with_source(source).await
            }
        }
    }

    /// Run until `source` ends or the service is stopped.
    pub async fn run_with_source<S>(&self, source: S) -> Result<(), RdsError>
    where
        S: EventSource + 'static,
    {
        let client_config = self.config.to_client_config();
        client_config.validate()?;
        info!("encoder at {}", client_config.address());

        let client = SmartGenClient::spawn(client_config);
        let watcher = tokio::spawn(log_state_changes(client.watch_state(), self.cancel.clone()));

        let mut orchestrator = Orchestrator::new(
            self.normalizer(),
            client,
            self.config.to_playout_config(),
        );
        if let Some(sink) = preview::from_config(&self.config.preview) {
            orchestrator = orchestrator.with_preview(sink);
        }
        if self.config.alerts_enabled() {
            orchestrator = orchestrator.with_alerts(Arc::new(preview::LogAlerts));
        }

        orchestrator.run(source, self.cancel.clone()).await;
        watcher.abort();
        info!("encoder service stopped");
        Ok(())
    }

    fn normalizer(&self) -> Normalizer {
        let config = self.config.to_normalizer_config();
        let denylist: Arc<dyn Denylist> = match self.config.wordlist_path() {
            Some(path) => Arc::new(WordList::load(&path)),
            None => Arc::new(WordList::empty()),
        };
        Normalizer::new(config, denylist)
    }
}

async fn log_state_changes(mut state: watch::Receiver<ConnectionState>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let current = state.borrow_and_update().clone();
        match &current {
            ConnectionState::Connected { .. } => info!("encoder {current}"),
            ConnectionState::Faulted { reason } => error!("encoder faulted: {reason}"),
            ConnectionState::Disconnected => warn!("encoder {current}"),
            ConnectionState::Connecting => info!("encoder {current}"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
