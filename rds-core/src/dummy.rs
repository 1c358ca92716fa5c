//! A stand-in SmartGen encoder for tests and bench setups.
//!
//! Accepts one client at a time, records every received line and answers
//! `OK`, unless a script says otherwise.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{LineTerminator, MAX_LINE_LENGTH};

/// How the dummy answers one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    No,
    /// Read the line and never answer.
    Silent,
    /// Read the line and drop the connection.
    Hangup,
}

/// Reply formatting.
#[derive(Debug, Clone, Default)]
pub struct DummyOptions {
    /// Replies consumed in order across connections; `Ok` once exhausted.
    pub script: Vec<Reply>,
    /// Line ending after each reply. `None` sends a bare `OK` like some
    /// real units do.
    pub reply_terminator: Option<LineTerminator>,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Reply>>,
    connections: AtomicUsize,
}

impl Shared {
    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Reply::Ok)
    }

    fn record(&self, line: String) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

pub struct DummyEncoder {
    addr: SocketAddr,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DummyEncoder {
    /// Listen on an ephemeral localhost port, always answering `OK\r\n`.
    pub async fn start() -> std::io::Result<Self> {
        Self::start_scripted([]).await
    }

    /// Listen on an ephemeral localhost port with scripted replies.
    pub async fn start_scripted(script: impl IntoIterator<Item = Reply>) -> std::io::Result<Self> {
        Self::bind(
            "127.0.0.1:0",
            DummyOptions {
                script: script.into_iter().collect(),
                reply_terminator: Some(LineTerminator::Crlf),
            },
        )
        .await
    }

    pub async fn bind(addr: impl ToSocketAddrs, options: DummyOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            script: Mutex::new(options.script.into_iter().collect()),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        info!("dummy encoder listening on {addr}");

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            options.reply_terminator,
            cancel.clone(),
        ));

        Ok(Self {
            addr,
            shared,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every line received so far, terminators stripped.
    pub fn received(&self) -> Vec<String> {
        self.shared
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Stop listening and drop any open connection.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("dummy encoder task failed: {e}");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    terminator: Option<LineTerminator>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            },
        };
        shared.connections.fetch_add(1, Ordering::SeqCst);
        info!("connection from {peer}");

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = serve(stream, &shared, terminator) => {
                if let Err(e) = result {
                    debug!("connection from {peer} ended: {e}");
                }
            }
        }
        info!("{peer} disconnected");
    }
}

async fn serve(
    stream: TcpStream,
    shared: &Shared,
    terminator: Option<LineTerminator>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if line.is_empty() {
            continue;
        }
        info!("received: {line}");
        shared.record(line);

        let word: &[u8] = match shared.next_reply() {
            Reply::Ok => b"OK",
            Reply::No => b"NO",
            Reply::Silent => continue,
            Reply::Hangup => return Ok(()),
        };
        writer.write_all(word).await?;
        if let Some(terminator) = terminator {
            writer.write_all(terminator.as_bytes()).await?;
        }
        writer.flush().await?;
    }
    Ok(())
}
