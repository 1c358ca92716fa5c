//! Track event sources: JSON lines on stdin or over TCP.
//!
//! Each line is one "now playing" payload, parsed by
//! [`TrackEvent::from_json`]. Bad lines are logged and skipped; the source
//! only ends when its input does.

use std::net::SocketAddr;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rds_core::{EventSource, RdsError, TrackEvent};

/// Longest payload line accepted from a source.
pub const MAX_PAYLOAD_LINE: usize = 64 * 1024;

// ── JsonLines ────────────────────────────────────────────────────

/// Newline-delimited JSON over any async reader.
pub struct JsonLines<R> {
    lines: FramedRead<R, LinesCodec>,
    label: String,
}

impl<R: AsyncRead + Unpin + Send> JsonLines<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_PAYLOAD_LINE)),
            label: label.into(),
        }
    }
}

impl JsonLines<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for JsonLines<R> {
    async fn next_event(&mut self) -> Option<TrackEvent> {
        loop {
            match self.lines.next().await? {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match TrackEvent::from_json(&line) {
                        Ok(event) => return Some(event),
                        Err(e) => warn!("{}: skipping payload: {e}", self.label),
                    }
                }
                // LinesCodec discards the rest of an oversized line.
                Err(e) => warn!("{}: unreadable line: {e}", self.label),
            }
        }
    }
}

// ── TcpSource ────────────────────────────────────────────────────

/// Accepts any number of TCP clients, each sending JSON lines.
pub struct TcpSource {
    addr: SocketAddr,
    rx: mpsc::Receiver<TrackEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TcpSource {
    pub async fn bind(addr: &str, buffer: usize) -> Result<Self, RdsError> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, tx, cancel.clone()));
        info!("listening for track events on {addr}");
        Ok(Self {
            addr,
            rx,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TcpSource {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

#[async_trait]
impl EventSource for TcpSource {
    async fn next_event(&mut self) -> Option<TrackEvent> {
        self.rx.recv().await
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<TrackEvent>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            r = listener.accept() => r,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("event client connected from {peer}");
                tokio::spawn(read_client(stream, peer, tx.clone(), cancel.clone()));
            }
            Err(e) => warn!("accept error: {e}"),
        }
    }
}

async fn read_client(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<TrackEvent>,
    cancel: CancellationToken,
) {
    let mut lines = JsonLines::new(stream, peer.to_string());
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            e = lines.next_event() => e,
        };
        let Some(event) = event else {
            debug!("event client {peer} disconnected");
            return;
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn parses_lines_and_skips_garbage() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"artist\":\"Owl City\",\"title\":\"Fireflies\",\"duration\":228}\n")
            .read(b"not json\n\n")
            .read(b"{\"spin\":{\"artist\":\"A\",\"song\":\"B\"}}\n")
            .build();
        let mut source = JsonLines::new(reader, "test");

        let first = source.next_event().await.unwrap();
        assert_eq!(first.artist, "Owl City");
        assert_eq!(first.duration, Some(228));

        let second = source.next_event().await.unwrap();
        assert_eq!(second.title, "B");

        assert!(source.next_event().await.is_none());
    }

    #[tokio::test]
    async fn empty_payload_is_skipped() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"artist\":\"\",\"title\":\"\"}\n")
            .build();
        let mut source = JsonLines::new(reader, "test");
        assert!(source.next_event().await.is_none());
    }

    #[tokio::test]
    async fn tcp_source_merges_clients() {
        let mut source = TcpSource::bind("127.0.0.1:0", 4).await.unwrap();
        let addr = source.local_addr();

        let mut a = TcpStream::connect(addr).await.unwrap();
        a.write_all(b"{\"artist\":\"One\",\"title\":\"A\"}\n").await.unwrap();
        let got = source.next_event().await.unwrap();
        assert_eq!(got.artist, "One");

        let mut b = TcpStream::connect(addr).await.unwrap();
        b.write_all(b"{\"artist\":\"Two\",\"title\":\"B\"}\n").await.unwrap();
        let got = source.next_event().await.unwrap();
        assert_eq!(got.artist, "Two");
    }
}
