//! Playout orchestration: track events in, encoder commands out.
//!
//! For each [`TrackEvent`] the [`Orchestrator`] normalizes the text,
//! builds the RT+ tags, formats `[TEXT, RT+TAG]` and submits them as one
//! unit. Event intake runs on its own task and hands events over a bounded
//! channel; under [`SubmitPolicy::Supersede`] only the newest event is ever
//! worked on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{self, ProtocolCommand, Verb};
use crate::error::{CommandError, RdsError};
use crate::network::{SmartGenClient, SubmitPolicy, SubmitReport};
use crate::rtplus::{self, RtPlusOptions, ToggleState};
use crate::text::{NormalizedText, Normalizer};
use crate::track::TrackEvent;

// ── Seams ────────────────────────────────────────────────────────

/// Where track events come from.
#[async_trait]
pub trait EventSource: Send {
    /// The next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<TrackEvent>;
}

/// Receives what went on air.
#[async_trait]
pub trait PreviewSink: Send + Sync {
    async fn publish(&self, preview: &Preview) -> Result<(), RdsError>;
}

/// Receives a notice whenever the profanity filter touched a track.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn profanity(&self, alert: &ProfanityAlert) -> Result<(), RdsError>;
}

/// Raw metadata next to what the filter made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfanityAlert {
    pub artist: String,
    pub title: String,
    /// Text after filtering; the idle text when the track was dropped.
    pub filtered: String,
    pub hits: usize,
    pub dropped: bool,
}

/// The text that was accepted by the encoder, with its tagged fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub text: String,
    pub artist: String,
    pub title: String,
    pub toggle: bool,
}

/// Events pushed through an mpsc channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<TrackEvent>,
}

impl ChannelSource {
    pub fn new(depth: usize) -> (mpsc::Sender<TrackEvent>, Self) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Option<TrackEvent> {
        self.rx.recv().await
    }
}

// ── Orchestrator ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayoutConfig {
    pub policy: SubmitPolicy,
    /// Send `RT+TAG` after `TEXT`.
    pub rt_plus: bool,
    /// RT+ item-running bit.
    pub running_bit: bool,
    /// Expire RT+ tags after the track's duration.
    pub duration_timeout: bool,
    /// Events buffered between intake and submission.
    pub intake_depth: usize,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            policy: SubmitPolicy::Supersede,
            rt_plus: true,
            running_bit: true,
            duration_timeout: true,
            intake_depth: 16,
        }
    }
}

/// Commands ready to submit for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub text: NormalizedText,
    pub commands: Vec<ProtocolCommand>,
    /// Toggle bit the encoder holds once this track's `RT+TAG` lands.
    pub toggle: bool,
}

pub struct Orchestrator {
    normalizer: Normalizer,
    client: SmartGenClient,
    preview: Option<Arc<dyn PreviewSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
    toggle: ToggleState,
    config: PlayoutConfig,
}

impl Orchestrator {
    pub fn new(normalizer: Normalizer, client: SmartGenClient, config: PlayoutConfig) -> Self {
        Self {
            normalizer,
            client,
            preview: None,
            alerts: None,
            toggle: ToggleState::new(),
            config,
        }
    }

    pub fn with_preview(mut self, sink: Arc<dyn PreviewSink>) -> Self {
        self.preview = Some(sink);
        self
    }

    pub fn with_alerts(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    pub fn client(&self) -> &SmartGenClient {
        &self.client
    }

    pub fn toggle(&self) -> ToggleState {
        self.toggle
    }

    /// Normalize and format one event. `None` means the track is not sent;
    /// the reason has been logged.
    pub fn prepare(&mut self, event: &TrackEvent) -> Option<Prepared> {
        let text = self.normalizer.normalize(&event.artist, &event.title);
        if text.profanity_hits() > 0 {
            self.raise_alert(event, &text);
        }
        if text.is_dropped() {
            warn!(
                artist = %event.artist,
                title = %event.title,
                hits = text.profanity_hits(),
                "track dropped by profanity policy"
            );
            return None;
        }
        if text.profanity_hits() > 0 {
            info!("filtered {} denied word(s) from {:?}", text.profanity_hits(), text.as_str());
        }

        let text_command = match command::format(Verb::Text, text.as_str()) {
            Ok(c) => c,
            Err(e) => {
                error!("refusing to send track {:?} - {:?}: {e}", event.artist, event.title);
                return None;
            }
        };

        let toggle = self.toggle.peek();
        let mut commands = vec![text_command];

        if self.config.rt_plus {
            let duration = event.duration.filter(|_| self.config.duration_timeout);
            let options = RtPlusOptions {
                running: self.config.running_bit,
                timeout_minutes: rtplus::timeout_minutes(duration),
            };
            match rtplus::encode(&text, toggle, options) {
                Ok(tags) if tags.is_empty() => debug!("nothing to tag in {:?}", text.as_str()),
                Ok(tags) => commands.extend(tags),
                Err(e) => error!("RT+TAG failed validation, sending TEXT only: {e}"),
            }
        }

        Some(Prepared {
            text,
            commands,
            toggle,
        })
    }

    /// Prepare, submit and report one event.
    pub async fn handle(&mut self, event: TrackEvent) -> Option<SubmitReport> {
        let prepared = self.prepare(&event)?;
        info!(
            "now playing: {:?} ({} command(s), toggle {})",
            prepared.text.as_str(),
            prepared.commands.len(),
            u8::from(prepared.toggle)
        );

        let report = self.client.submit(prepared.commands.clone()).await;
        log_report(&report);

        // the encoder only flips its bit for a tag it accepted
        if matches!(report.result_for(Verb::RtTag), Some(Ok(()))) {
            self.toggle.advance();
        }
        if matches!(report.result_for(Verb::Text), Some(Ok(()))) {
            self.publish_preview(&prepared, self.toggle.value());
        }
        Some(report)
    }

    /// Consume `source` until it ends or `cancel` fires, then shut the
    /// client down.
    pub async fn run<S>(mut self, source: S, cancel: CancellationToken)
    where
        S: EventSource + 'static,
    {
        let (tx, mut rx) = mpsc::channel(self.config.intake_depth.max(1));
        let intake = tokio::spawn(intake(source, tx, cancel.clone()));

        let mut pending: Option<TrackEvent> = None;
        let mut open = true;

        'events: loop {
            let event = match pending.take() {
                Some(event) => event,
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                },
            };
            let event = self.coalesce(event, &mut rx);
            let supersede = self.config.policy == SubmitPolicy::Supersede;

            let submit = self.handle(event);
            tokio::pin!(submit);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'events,
                    newer = rx.recv(), if supersede && open => match newer {
                        Some(newer) => {
                            warn!("track superseded mid-submission by {:?} - {:?}", newer.artist, newer.title);
                            pending = Some(newer);
                            break;
                        }
                        None => open = false,
                    },
                    _ = &mut submit => break,
                }
            }
        }

        intake.abort();
        let _ = intake.await;
        info!("playout stopped");
        self.client.shutdown().await;
    }

    /// Under supersede, skip to the newest buffered event.
    fn coalesce(&self, mut event: TrackEvent, rx: &mut mpsc::Receiver<TrackEvent>) -> TrackEvent {
        if self.config.policy != SubmitPolicy::Supersede {
            return event;
        }
        while let Ok(newer) = rx.try_recv() {
            info!("skipping stale track {:?} - {:?}", event.artist, event.title);
            event = newer;
        }
        event
    }

    fn raise_alert(&self, event: &TrackEvent, text: &NormalizedText) {
        let Some(sink) = &self.alerts else {
            return;
        };
        let alert = ProfanityAlert {
            artist: event.artist.clone(),
            title: event.title.clone(),
            filtered: text.as_str().to_string(),
            hits: text.profanity_hits(),
            dropped: text.is_dropped(),
        };
        let sink = Arc::clone(sink);
        tokio::spawn(async move {
            if let Err(e) = sink.profanity(&alert).await {
                warn!("profanity alert failed: {e}");
            }
        });
    }

    fn publish_preview(&self, prepared: &Prepared, toggle: bool) {
        let Some(sink) = &self.preview else {
            return;
        };
        let preview = preview_for(prepared, toggle);
        let sink = Arc::clone(sink);
        tokio::spawn(async move {
            if let Err(e) = sink.publish(&preview).await {
                warn!("preview publish failed: {e}");
            }
        });
    }
}

async fn intake<S: EventSource>(mut source: S, tx: mpsc::Sender<TrackEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = source.next_event() => event,
        };
        let Some(event) = event else {
            info!("event source exhausted");
            return;
        };
        debug!("track event: {:?} - {:?}", event.artist, event.title);
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Artist and title come from the tags actually sent, so the preview shows
/// what RT+ receivers show.
fn preview_for(prepared: &Prepared, toggle: bool) -> Preview {
    let tags = prepared
        .commands
        .iter()
        .find(|c| c.verb() == Verb::RtTag)
        .and_then(|c| match rtplus::decode_rt_plus(c.value(), prepared.text.as_str()) {
            Ok(tags) => {
                debug!("sent RT+ decodes to artist {:?}, title {:?}", tags.artist, tags.title);
                Some(tags)
            }
            Err(e) => {
                warn!("sent RT+TAG does not decode: {e}");
                None
            }
        })
        .unwrap_or_default();

    Preview {
        text: prepared.text.as_str().to_string(),
        artist: tags.artist,
        title: tags.title,
        toggle,
    }
}

fn log_report(report: &SubmitReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => {}
            Err(CommandError::Rejected { command }) => warn!("encoder rejected {command}"),
            Err(CommandError::Superseded) => info!("{} superseded", outcome.command),
            Err(e) if e.is_connection_failure() => {
                warn!("{} not delivered ({e}); waiting for the next track", outcome.command)
            }
            Err(e) => error!("{} not delivered: {e}", outcome.command),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
