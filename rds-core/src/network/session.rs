//! One live, framed encoder connection.
//!
//! A `Session` does strictly serialized request/response exchanges: write a
//! command, wait for exactly one response line, classify it. It is generic
//! over the stream so tests can drive it with `tokio_test::io::Builder`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::{Response, SmartGenCodec};
use crate::command::ProtocolCommand;
use crate::error::CommandError;

/// Write and response deadlines for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub write: Duration,
    pub response: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            write: Duration::from_secs(5),
            response: Duration::from_secs(5),
        }
    }
}

pub struct Session<S> {
    framed: Framed<S, SmartGenCodec>,
    timeouts: Timeouts,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, codec: SmartGenCodec, timeouts: Timeouts) -> Self {
        Self {
            framed: Framed::new(stream, codec),
            timeouts,
        }
    }

    /// Send one command and wait for its response.
    ///
    /// `Ok` on `OK`, [`CommandError::Rejected`] on `NO`. Anything else,
    /// including a timeout or an unexpected line, is
    /// [`CommandError::ConnectionLost`] and the session must be dropped.
    pub async fn exchange(&mut self, command: &ProtocolCommand) -> Result<(), CommandError> {
        let line = command.to_line();

        match tokio::time::timeout(self.timeouts.write, self.framed.send(command.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(lost(format!("write failed: {e}"))),
            Err(_) => {
                return Err(lost(format!(
                    "write timed out after {:?}",
                    self.timeouts.write
                )));
            }
        }
        tracing::debug!("sent {line}");

        let response = match tokio::time::timeout(self.timeouts.response, self.framed.next()).await
        {
            Ok(Some(Ok(response))) => response,
            Ok(Some(Err(e))) => return Err(lost(format!("read failed: {e}"))),
            Ok(None) => return Err(lost("encoder closed the connection".to_string())),
            Err(_) => {
                return Err(lost(format!(
                    "no response within {:?}",
                    self.timeouts.response
                )));
            }
        };

        match response {
            Response::Ok => Ok(()),
            Response::No => Err(CommandError::Rejected { command: line }),
            Response::Other(other) => Err(lost(format!("unexpected response {other:?}"))),
        }
    }

    /// Resolve once the idle connection is no longer usable.
    ///
    /// Returns the reason: EOF, a read error, or unsolicited data (which
    /// would desynchronize the next exchange).
    pub async fn closed(&mut self) -> String {
        match self.framed.next().await {
            None => "encoder closed the connection".to_string(),
            Some(Err(e)) => format!("read failed: {e}"),
            Some(Ok(response)) => format!("unsolicited response {response:?}"),
        }
    }

    /// Flush and shut down the write half.
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<ProtocolCommand>::close(&mut self.framed).await {
            tracing::debug!("error closing encoder socket: {e}");
        }
    }
}

fn lost(reason: String) -> CommandError {
    CommandError::ConnectionLost { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LineTerminator;
    use crate::command::{Verb, format};

    fn session(mock: tokio_test::io::Mock) -> Session<tokio_test::io::Mock> {
        Session::new(mock, SmartGenCodec::new(LineTerminator::Crlf), Timeouts::default())
    }

    #[tokio::test]
    async fn ok_response_succeeds() {
        let mock = tokio_test::io::Builder::new()
            .write(b"TEXT=HELLO\r\n")
            .read(b"OK\r\n")
            .build();
        let mut s = session(mock);
        s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn no_response_is_rejection() {
        let mock = tokio_test::io::Builder::new()
            .write(b"TEXT=HELLO\r\n")
            .read(b"NO\r\n")
            .write(b"TEXT=AGAIN\r\n")
            .read(b"OK\r\n")
            .build();
        let mut s = session(mock);
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert_eq!(
            err,
            CommandError::Rejected {
                command: "TEXT=HELLO".into()
            }
        );
        // session remains usable
        s.exchange(&format(Verb::Text, "AGAIN").unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn eof_is_connection_lost() {
        let mock = tokio_test::io::Builder::new().write(b"TEXT=HELLO\r\n").build();
        let mut s = session(mock);
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn garbage_response_is_connection_lost() {
        let mock = tokio_test::io::Builder::new()
            .write(b"TEXT=HELLO\r\n")
            .read(b"ERR 42\r\n")
            .build();
        let mut s = session(mock);
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert!(matches!(err, CommandError::ConnectionLost { reason } if reason.contains("ERR 42")));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_encoder_times_out() {
        let mock = tokio_test::io::Builder::new()
            .write(b"TEXT=HELLO\r\n")
            .wait(Duration::from_secs(30))
            .build();
        let mut s = session(mock);
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert!(matches!(err, CommandError::ConnectionLost { reason } if reason.contains("no response")));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        // the socket accepts nothing for longer than the write deadline
        let mock = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(30))
            .build();
        let mut s = Session::new(
            mock,
            SmartGenCodec::new(LineTerminator::Crlf),
            Timeouts {
                write: Duration::from_secs(2),
                response: Duration::from_secs(5),
            },
        );
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert!(matches!(err, CommandError::ConnectionLost { reason } if reason.contains("write timed out")));
    }

    #[tokio::test]
    async fn write_error_is_connection_lost() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let mut s = session(mock);
        let err = s.exchange(&format(Verb::Text, "HELLO").unwrap()).await.unwrap_err();
        assert!(matches!(err, CommandError::ConnectionLost { reason } if reason.contains("write failed")));
    }

    #[tokio::test]
    async fn closed_reports_eof() {
        let mock = tokio_test::io::Builder::new().build();
        let mut s = session(mock);
        assert!(s.closed().await.contains("closed"));
    }
}
