//! SmartGen protocol client.
//!
//! [`SmartGenClient`] is a cheap handle to a background task that owns the
//! encoder socket end-to-end. Connecting, reconnecting with backoff and
//! every command exchange happen on that one task, so there is never more
//! than one connection and never two exchanges in flight.
//!
//! ```text
//!   submit() ──mpsc──► ┌──────────────┐ ◄──TCP──► encoder
//!   state()  ◄─watch── │ client task  │
//!   shutdown() ─token─►└──────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{Session, Timeouts};
use crate::codec::{LineTerminator, SmartGenCodec};
use crate::command::{ProtocolCommand, Verb};
use crate::error::{CommandError, RdsError};
use crate::state::{Backoff, ConnectionState};

// ── Configuration ────────────────────────────────────────────────

/// What happens to a submission when a newer one is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    /// Abandon the older submission's unsent commands.
    #[default]
    Supersede,
    /// Run submissions in arrival order.
    Queue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub timeouts: Timeouts,
    pub backoff: Backoff,
    pub terminator: LineTerminator,
    pub policy: SubmitPolicy,
    /// Submissions buffered between callers and the client task.
    pub queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            connect_timeout: Duration::from_secs(5),
            timeouts: Timeouts::default(),
            backoff: Backoff::default(),
            terminator: LineTerminator::Crlf,
            policy: SubmitPolicy::Supersede,
            queue_depth: 16,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Reject settings no amount of retrying can fix.
    pub fn validate(&self) -> Result<(), RdsError> {
        if self.host.trim().is_empty() {
            return Err(RdsError::ConfigFault("encoder host is empty".into()));
        }
        if self.port == 0 {
            return Err(RdsError::ConfigFault("encoder port is 0".into()));
        }
        if self.queue_depth == 0 {
            return Err(RdsError::ConfigFault("queue depth must be at least 1".into()));
        }
        if self.timeouts.write.is_zero() || self.timeouts.response.is_zero() {
            return Err(RdsError::ConfigFault("socket timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Reports ──────────────────────────────────────────────────────

/// Result of one command within a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: ProtocolCommand,
    pub result: Result<(), CommandError>,
}

/// Per-command results of one submission, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl SubmitReport {
    /// Every command gets the same error.
    pub fn failed(commands: Vec<ProtocolCommand>, error: CommandError) -> Self {
        Self {
            outcomes: commands
                .into_iter()
                .map(|command| CommandOutcome {
                    command,
                    result: Err(error.clone()),
                })
                .collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn first_error(&self) -> Option<&CommandError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }

    /// Result of the first command with this verb.
    pub fn result_for(&self, verb: Verb) -> Option<&Result<(), CommandError>> {
        self.outcomes
            .iter()
            .find(|o| o.command.verb() == verb)
            .map(|o| &o.result)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ── SmartGenClient ───────────────────────────────────────────────

struct Submission {
    commands: Vec<ProtocolCommand>,
    reply: oneshot::Sender<SubmitReport>,
}

impl Submission {
    fn reject(self, error: CommandError) {
        let _ = self.reply.send(SubmitReport::failed(self.commands, error));
    }
}

/// Handle to the encoder connection task.
pub struct SmartGenClient {
    tx: mpsc::Sender<Submission>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SmartGenClient {
    /// Spawn the connection task. It starts dialing immediately.
    pub fn spawn(config: ClientConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let actor = ClientTask {
            backoff: config.backoff,
            config,
            rx,
            state: ConnectionState::Disconnected,
            state_tx,
            cancel: cancel.clone(),
            pending: None,
        };
        let task = tokio::spawn(actor.run());

        Self {
            tx,
            state,
            cancel,
            task,
        }
    }

    /// Send `commands` in order and wait for every outcome.
    ///
    /// Never blocks indefinitely: when the encoder is not connected the
    /// whole submission fails fast with [`CommandError::NotConnected`].
    /// Dropping the returned future abandons any commands not yet sent.
    pub async fn submit(&self, commands: Vec<ProtocolCommand>) -> SubmitReport {
        if commands.is_empty() {
            return SubmitReport::default();
        }
        let (reply, rx) = oneshot::channel();
        let submission = Submission {
            commands: commands.clone(),
            reply,
        };
        if self.tx.send(submission).await.is_err() {
            return SubmitReport::failed(commands, CommandError::Shutdown);
        }
        rx.await
            .unwrap_or_else(|_| SubmitReport::failed(commands, CommandError::Shutdown))
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until connected, or fail if the client faults or stops.
    pub async fn wait_connected(&self) -> Result<(), RdsError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| s.is_connected() || s.is_faulted())
            .await
            .map_err(|_| RdsError::ChannelClosed)?
            .clone();
        match state {
            ConnectionState::Faulted { reason } => Err(RdsError::ConfigFault(reason)),
            _ => Ok(()),
        }
    }

    /// Close the socket, abandon any backoff wait and join the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.tx);
        if let Err(e) = self.task.await {
            error!("encoder client task panicked: {e}");
        }
    }
}

// ── Client task ──────────────────────────────────────────────────

enum Dial {
    Connected(Session<TcpStream>),
    Faulted(String),
    Stop,
}

enum Flow {
    Reconnect,
    Stop,
}

struct ClientTask {
    config: ClientConfig,
    rx: mpsc::Receiver<Submission>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    backoff: Backoff,
    /// A newer submission pulled off the queue mid-exchange.
    pending: Option<Submission>,
}

impl ClientTask {
    async fn run(mut self) {
        if let Err(e) = self.config.validate() {
            self.enter_fault(e.to_string());
            self.serve_faulted().await;
            return;
        }

        loop {
            let session = match self.connect().await {
                Dial::Connected(session) => session,
                Dial::Faulted(reason) => {
                    self.enter_fault(reason);
                    self.serve_faulted().await;
                    return;
                }
                Dial::Stop => break,
            };
            match self.serve(session).await {
                Flow::Reconnect => {
                    let delay = self.backoff.next_delay();
                    debug!("reconnecting in {delay:?}");
                    if !self.wait_backoff(delay).await {
                        break;
                    }
                }
                Flow::Stop => break,
            }
        }

        self.state.force_disconnect();
        self.publish();
        self.rx.close();
        while let Ok(submission) = self.rx.try_recv() {
            submission.reject(CommandError::Shutdown);
        }
        info!("encoder client stopped");
    }

    // ── State ────────────────────────────────────────────────────

    fn transition(&mut self, f: impl FnOnce(&mut ConnectionState) -> Result<(), RdsError>) {
        if let Err(e) = f(&mut self.state) {
            error!("invalid connection transition from {}: {e}", self.state);
        }
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn enter_fault(&mut self, reason: String) {
        error!("encoder client faulted: {reason}");
        self.transition(|s| s.fault(reason));
    }

    // ── Connecting ───────────────────────────────────────────────

    async fn connect(&mut self) -> Dial {
        let address = self.config.address();
        loop {
            self.transition(ConnectionState::begin_connect);
            debug!("connecting to encoder at {address}");

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Dial::Stop,
                result = self.dial() => result,
            };

            let reason = match attempt {
                Ok(stream) => {
                    self.transition(ConnectionState::complete_connect);
                    self.backoff.reset();
                    info!("connected to encoder at {address}");
                    let codec = SmartGenCodec::new(self.config.terminator);
                    return Dial::Connected(Session::new(stream, codec, self.config.timeouts));
                }
                Err(DialError::Fatal(reason)) => return Dial::Faulted(reason),
                Err(DialError::Retry(reason)) => reason,
            };

            let delay = self.backoff.next_delay();
            warn!("cannot connect to encoder at {address}: {reason}; retrying in {delay:?}");
            if !self.wait_backoff(delay).await {
                return Dial::Stop;
            }
        }
    }

    async fn dial(&self) -> Result<TcpStream, DialError> {
        let host = self.config.host.as_str();
        let addrs: Vec<_> = tokio::net::lookup_host((host, self.config.port))
            .await
            .map_err(|e| DialError::Fatal(format!("cannot resolve encoder host {host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(DialError::Fatal(format!("encoder host {host} has no addresses")));
        }

        let mut last = String::new();
        for addr in addrs {
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed: {e}");
                    }
                    return Ok(stream);
                }
                Ok(Err(e)) => last = format!("{addr}: {e}"),
                Err(_) => {
                    last = format!("{addr}: timed out after {:?}", self.config.connect_timeout)
                }
            }
        }
        Err(DialError::Retry(last))
    }

    /// Sleep out a backoff delay, failing submissions that arrive meanwhile.
    /// Returns `false` when the client should stop.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        if let Some(submission) = self.pending.take() {
            submission.reject(CommandError::NotConnected);
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                submission = self.rx.recv() => match submission {
                    Some(submission) => {
                        warn!("encoder not connected; dropping submission of {} commands", submission.commands.len());
                        submission.reject(CommandError::NotConnected);
                    }
                    None => return false,
                },
            }
        }
    }

    // ── Connected ────────────────────────────────────────────────

    async fn serve(&mut self, mut session: Session<TcpStream>) -> Flow {
        loop {
            let submission = match self.pending.take() {
                Some(submission) => submission,
                None => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        session.close().await;
                        return Flow::Stop;
                    }
                    submission = self.rx.recv() => match submission {
                        Some(submission) => submission,
                        None => {
                            session.close().await;
                            return Flow::Stop;
                        }
                    },
                    reason = session.closed() => {
                        self.lose(&reason);
                        return Flow::Reconnect;
                    }
                },
            };
            let Submission { commands, reply } = self.latest(submission);

            let (report, lost) = self.execute(&mut session, commands, &reply).await;
            let stopping = self.cancel.is_cancelled();
            if let Some(reason) = &lost {
                if !stopping {
                    self.lose(reason);
                }
            }
            if reply.send(report).is_err() {
                debug!("submission report dropped; submitter gone");
            }

            match lost {
                None => {}
                Some(_) if stopping => {
                    session.close().await;
                    return Flow::Stop;
                }
                Some(_) => return Flow::Reconnect,
            }
        }
    }

    /// Under supersede, skip to the newest queued submission.
    fn latest(&mut self, mut submission: Submission) -> Submission {
        if self.config.policy != SubmitPolicy::Supersede {
            return submission;
        }
        while let Ok(newer) = self.rx.try_recv() {
            info!(
                "submission of {} commands superseded before sending",
                submission.commands.len()
            );
            submission.reject(CommandError::Superseded);
            submission = newer;
        }
        submission
    }

    /// Run one submission's commands. Also returns the reason if the
    /// connection was lost.
    async fn execute(
        &mut self,
        session: &mut Session<TcpStream>,
        commands: Vec<ProtocolCommand>,
        reply: &oneshot::Sender<SubmitReport>,
    ) -> (SubmitReport, Option<String>) {
        let mut outcomes = Vec::with_capacity(commands.len());
        let mut abandon: Option<CommandError> = None;
        let mut lost = None;

        for command in commands {
            if let Some(error) = &abandon {
                outcomes.push(CommandOutcome {
                    command,
                    result: Err(error.clone()),
                });
                continue;
            }
            if reply.is_closed() {
                debug!("submitter went away; skipping {command}");
                abandon = Some(CommandError::Superseded);
                outcomes.push(CommandOutcome {
                    command,
                    result: Err(CommandError::Superseded),
                });
                continue;
            }
            if self.config.policy == SubmitPolicy::Supersede && !outcomes.is_empty() {
                if let Ok(newer) = self.rx.try_recv() {
                    info!("newer submission waiting; abandoning remaining commands");
                    self.pending = Some(newer);
                    abandon = Some(CommandError::Superseded);
                    outcomes.push(CommandOutcome {
                        command,
                        result: Err(CommandError::Superseded),
                    });
                    continue;
                }
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(CommandError::Shutdown),
                result = session.exchange(&command) => result,
            };

            match &result {
                Ok(()) => debug!("{command} -> OK"),
                Err(CommandError::Rejected { .. }) => warn!("encoder rejected {command}"),
                Err(CommandError::ConnectionLost { reason }) => {
                    warn!("connection lost while sending {command}: {reason}");
                    lost = Some(reason.clone());
                    abandon = result.clone().err();
                }
                Err(e) => {
                    lost = Some(e.to_string());
                    abandon = Some(e.clone());
                }
            }
            outcomes.push(CommandOutcome { command, result });
        }

        (SubmitReport { outcomes }, lost)
    }

    fn lose(&mut self, reason: &str) {
        match self.state.connected_duration() {
            Some(up) => warn!("encoder connection lost after {up:.1?}: {reason}"),
            None => warn!("encoder connection lost: {reason}"),
        }
        self.transition(ConnectionState::connection_lost);
    }

    /// After a fault, answer every submission until told to stop.
    async fn serve_faulted(&mut self) {
        let reason = match &self.state {
            ConnectionState::Faulted { reason } => reason.clone(),
            other => other.to_string(),
        };
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                submission = self.rx.recv() => match submission {
                    Some(submission) => submission.reject(CommandError::Faulted(reason.clone())),
                    None => return,
                },
            }
        }
    }
}

enum DialError {
    /// Configuration problem; entering `Faulted`.
    Fatal(String),
    /// Transient; back off and retry.
    Retry(String),
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::format;
    use crate::dummy::{DummyEncoder, Reply};

    fn text(value: &str) -> ProtocolCommand {
        format(Verb::Text, value).unwrap()
    }

    fn config_for(dummy: &DummyEncoder) -> ClientConfig {
        let addr = dummy.local_addr();
        ClientConfig {
            timeouts: Timeouts {
                write: Duration::from_millis(500),
                response: Duration::from_millis(500),
            },
            backoff: Backoff::new(Duration::from_millis(20), Duration::from_millis(100)),
            ..ClientConfig::new(addr.ip().to_string(), addr.port())
        }
    }

    #[test]
    fn config_validation() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new("", 5000).validate().is_err());
        assert!(ClientConfig::new("encoder.local", 0).validate().is_err());
    }

    #[test]
    fn report_helpers() {
        let report = SubmitReport::failed(vec![text("A"), text("B")], CommandError::NotConnected);
        assert_eq!(report.len(), 2);
        assert!(!report.is_success());
        assert_eq!(report.first_error(), Some(&CommandError::NotConnected));
        assert!(report.result_for(Verb::RtTag).is_none());
        assert!(SubmitReport::default().is_success());
    }

    #[tokio::test]
    async fn sends_commands_in_order() {
        let dummy = DummyEncoder::start().await.unwrap();
        let client = SmartGenClient::spawn(config_for(&dummy));
        client.wait_connected().await.unwrap();

        let report = client.submit(vec![text("ONE"), text("TWO")]).await;
        assert!(report.is_success());
        assert_eq!(dummy.received(), vec!["TEXT=ONE", "TEXT=TWO"]);

        client.shutdown().await;
        dummy.stop().await;
    }

    #[tokio::test]
    async fn invalid_config_faults() {
        let client = SmartGenClient::spawn(ClientConfig::new("127.0.0.1", 0));
        assert!(matches!(client.wait_connected().await, Err(RdsError::ConfigFault(_))));
        assert!(client.state().is_faulted());

        let report = client.submit(vec![text("X")]).await;
        assert!(matches!(report.first_error(), Some(CommandError::Faulted(_))));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn submissions_fail_fast_while_disconnected() {
        // Bind then drop a listener to get a port nobody serves.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = SmartGenClient::spawn(ClientConfig {
            backoff: Backoff::new(Duration::from_secs(30), Duration::from_secs(30)),
            ..ClientConfig::new("127.0.0.1", port)
        });
        let report = tokio::time::timeout(Duration::from_secs(5), client.submit(vec![text("X")]))
            .await
            .unwrap();
        assert_eq!(report.first_error(), Some(&CommandError::NotConnected));
        assert!(!client.state().is_connected());

        // shutdown abandons the 30s backoff immediately
        tokio::time::timeout(Duration::from_secs(2), client.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn supersede_skips_stale_submission() {
        let dummy = DummyEncoder::start().await.unwrap();
        let client = SmartGenClient::spawn(config_for(&dummy));
        client.wait_connected().await.unwrap();

        let (first, second) = tokio::join!(
            client.submit(vec![text("OLD"), text("OLD TAG")]),
            client.submit(vec![text("NEW")]),
        );
        assert!(first.outcomes.iter().all(|o| o.result == Err(CommandError::Superseded)));
        assert!(second.is_success());
        assert_eq!(dummy.received(), vec!["TEXT=NEW"]);

        client.shutdown().await;
        dummy.stop().await;
    }

    #[tokio::test]
    async fn queue_policy_runs_everything() {
        let dummy = DummyEncoder::start().await.unwrap();
        let client = SmartGenClient::spawn(ClientConfig {
            policy: SubmitPolicy::Queue,
            ..config_for(&dummy)
        });
        client.wait_connected().await.unwrap();

        let (first, second) = tokio::join!(
            client.submit(vec![text("FIRST")]),
            client.submit(vec![text("SECOND")]),
        );
        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(dummy.received(), vec!["TEXT=FIRST", "TEXT=SECOND"]);

        client.shutdown().await;
        dummy.stop().await;
    }

    #[tokio::test]
    async fn rejection_keeps_connection() {
        let dummy = DummyEncoder::start_scripted([Reply::No]).await.unwrap();
        let client = SmartGenClient::spawn(config_for(&dummy));
        client.wait_connected().await.unwrap();

        let report = client.submit(vec![text("BAD"), text("NEXT")]).await;
        assert!(matches!(
            report.outcomes[0].result,
            Err(CommandError::Rejected { .. })
        ));
        assert_eq!(report.outcomes[1].result, Ok(()));
        assert!(client.state().is_connected());

        client.shutdown().await;
        dummy.stop().await;
    }
}
