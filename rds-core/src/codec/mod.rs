//! Line codec for the SmartGen ASCII protocol.
//!
//! Outbound: `VERB=VALUE` plus the configured terminator. Inbound: one
//! response line per command, classified as [`Response::Ok`],
//! [`Response::No`] or anything else.

use serde::{Deserialize, Serialize};

use crate::command::ProtocolCommand;

/// Longest response line accepted before the stream is considered garbage.
pub const MAX_LINE_LENGTH: usize = 256;

/// Line ending written after each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    Crlf,
    Lf,
    Cr,
}

impl LineTerminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineTerminator::Crlf => b"\r\n",
            LineTerminator::Lf => b"\n",
            LineTerminator::Cr => b"\r",
        }
    }
}

/// One classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    No,
    Other(String),
}

impl Response {
    fn classify(line: &str) -> Self {
        match line.trim() {
            "OK" => Response::Ok,
            "NO" => Response::No,
            other => Response::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmartGenCodec {
    terminator: LineTerminator,
}

impl SmartGenCodec {
    pub fn new(terminator: LineTerminator) -> Self {
        Self { terminator }
    }
}

impl tokio_util::codec::Decoder for SmartGenCodec {
    type Item = Response;
    type Error = crate::RdsError;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n' || b == b'\r') else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(crate::RdsError::LineTooLong {
                        size: src.len(),
                        max: MAX_LINE_LENGTH,
                    });
                }
                // Some units answer a bare `OK` with no line ending.
                if matches!(&src[..], b"OK" | b"NO") {
                    let line = src.split_to(2);
                    return Ok(Some(Response::classify(&String::from_utf8_lossy(&line))));
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line[..pos]);
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(Response::classify(&text)));
        }
    }
}

impl tokio_util::codec::Encoder<ProtocolCommand> for SmartGenCodec {
    type Error = crate::RdsError;

    fn encode(&mut self, item: ProtocolCommand, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        let line = item.to_line();
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(self.terminator.as_bytes());
        Ok(())
    }
}
