//! Configuration for the RDS encoder bridge.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rds_core::{
    Backoff, ClientConfig, DisplayOrder, LineTerminator, NormalizerConfig, PlayoutConfig,
    ProfanityPolicy, SubmitPolicy, Timeouts,
};

/// Shortest socket timeout accepted from a config file.
const MIN_TIMEOUT_MS: u64 = 100;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// SmartGen connection settings.
    pub encoder: EncoderSection,
    /// Text normalization.
    pub text: TextConfig,
    /// Profanity filtering.
    pub profanity: ProfanityConfig,
    /// RT+ tagging.
    pub rtplus: RtPlusConfig,
    /// Where track events come from.
    pub source: SourceConfig,
    /// Where accepted text is mirrored.
    pub preview: PreviewConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// SmartGen connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// First reconnect delay; doubles per failure.
    pub backoff_initial_ms: u64,
    /// Reconnect delay cap.
    pub backoff_max_ms: u64,
    /// "crlf", "lf" or "cr".
    pub line_terminator: LineTerminator,
    /// "supersede" or "queue".
    pub submit_policy: SubmitPolicy,
    /// Submissions buffered ahead of the connection task.
    pub queue_depth: usize,
}

/// Text normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// "artist_title" or "title_artist".
    pub display_order: DisplayOrder,
    /// Sent when a track has neither artist nor title.
    pub idle_text: String,
    /// Strip `(Explicit)`, `- Remastered` and similar noise.
    pub cleanup: bool,
}

/// Profanity filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfanityConfig {
    pub enabled: bool,
    /// "mask", "omit" or "drop_track".
    pub policy: ProfanityPolicy,
    /// JSON array or one-word-per-line file. Empty disables the list.
    pub wordlist: String,
    /// Log an alert with the raw and filtered text for every hit.
    pub alert: bool,
}

/// RT+ settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtPlusConfig {
    pub enabled: bool,
    pub running_bit: bool,
    /// Use the track duration as the RT+ item timeout.
    pub duration_timeout: bool,
}

/// Event source kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON lines on standard input.
    Stdin,
    /// JSON lines from TCP clients.
    Tcp,
}

/// Event source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Listen address for `kind = "tcp"`.
    pub listen: String,
    /// Events buffered between intake and submission.
    pub buffer: usize,
}

/// Preview sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    None,
    Log,
    File,
}

/// Preview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub sink: PreviewKind,
    /// JSON-lines output for `sink = "file"`.
    pub path: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            connect_timeout_ms: 5000,
            write_timeout_ms: 5000,
            response_timeout_ms: 5000,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
            line_terminator: LineTerminator::Crlf,
            submit_policy: SubmitPolicy::Supersede,
            queue_depth: 16,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            display_order: DisplayOrder::ArtistTitle,
            idle_text: String::new(),
            cleanup: true,
        }
    }
}

impl Default for ProfanityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: ProfanityPolicy::Mask,
            wordlist: "words.json".into(),
            alert: true,
        }
    }
}

impl Default for RtPlusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            running_bit: true,
            duration_timeout: true,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Stdin,
            listen: "127.0.0.1:5050".into(),
            buffer: 16,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            sink: PreviewKind::Log,
            path: "preview.jsonl".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl EncoderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Connection settings for `SmartGenClient`.
    pub fn to_client_config(&self) -> ClientConfig {
        let e = &self.encoder;
        let ms = |v: u64| Duration::from_millis(v.max(MIN_TIMEOUT_MS));
        ClientConfig {
            host: e.host.trim().to_string(),
            port: e.port,
            connect_timeout: ms(e.connect_timeout_ms),
            timeouts: Timeouts {
                write: ms(e.write_timeout_ms),
                response: ms(e.response_timeout_ms),
            },
            backoff: Backoff::new(
                Duration::from_millis(e.backoff_initial_ms.max(10)),
                Duration::from_millis(e.backoff_max_ms),
            ),
            terminator: e.line_terminator,
            policy: e.submit_policy,
            queue_depth: e.queue_depth.max(1),
        }
    }

    pub fn to_normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            display_order: self.text.display_order,
            idle_text: self.text.idle_text.clone(),
            cleanup: self.text.cleanup,
            profanity_filter: self.profanity.enabled,
            on_profanity: self.profanity.policy,
        }
    }

    pub fn to_playout_config(&self) -> PlayoutConfig {
        PlayoutConfig {
            policy: self.encoder.submit_policy,
            rt_plus: self.rtplus.enabled,
            running_bit: self.rtplus.running_bit,
            duration_timeout: self.rtplus.duration_timeout,
            intake_depth: self.source.buffer.max(1),
        }
    }

    /// Whether filtered tracks raise profanity alerts.
    pub fn alerts_enabled(&self) -> bool {
        self.profanity.enabled && self.profanity.alert
    }

    /// Wordlist path, if filtering is on and a list is configured.
    pub fn wordlist_path(&self) -> Option<PathBuf> {
        let path = self.profanity.wordlist.trim();
        (self.profanity.enabled && !path.is_empty()).then(|| PathBuf::from(path))
    }
}

// ── Tests ────────────────────────────────────────────────────────
