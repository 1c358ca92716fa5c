//! # rds-core
//!
//! Core library for driving a SmartGen RDS encoder with "now playing"
//! RadioText and RT+ tags.
//!
//! This crate contains:
//! - **Text**: `Normalizer`, turning arbitrary metadata into ≤ 64 chars of
//!   broadcast-safe ASCII, with transliteration, cleanup and profanity filtering
//! - **Command**: `ProtocolCommand` and the fail-closed `format`
//! - **RT+**: tag encoding/decoding and the toggle mirror
//! - **Codec**: `SmartGenCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `SmartGenClient`, the task that owns the encoder socket
//! - **State**: `ConnectionState` machine and reconnect `Backoff`
//! - **Playout**: `Orchestrator` wiring event sources to the client
//! - **Dummy**: `DummyEncoder` for tests and bench setups
//! - **Error**: `RdsError` and friends, `thiserror`-based

pub mod codec;
pub mod command;
pub mod dummy;
pub mod error;
pub mod network;
pub mod playout;
pub mod rtplus;
pub mod state;
pub mod text;
pub mod track;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{LineTerminator, Response, SmartGenCodec};
pub use command::{ProtocolCommand, TEXT_MAX_LEN, Verb, format};
pub use dummy::{DummyEncoder, DummyOptions, Reply};
pub use error::{CommandError, FormatError, RdsError};
pub use network::{
    ClientConfig, CommandOutcome, SmartGenClient, SubmitPolicy, SubmitReport, Timeouts,
};
pub use playout::{
    AlertSink, ChannelSource, EventSource, Orchestrator, PlayoutConfig, Prepared, Preview,
    PreviewSink, ProfanityAlert,
};
pub use rtplus::{ContentType, RtPlusPacket, RtPlusTag, ToggleState, decode_rt_plus};
pub use state::{Backoff, ConnectionState};
pub use text::{
    Denylist, DisplayOrder, NormalizedText, Normalizer, NormalizerConfig, ProfanityPolicy, Span,
    WordList,
};
pub use track::TrackEvent;
