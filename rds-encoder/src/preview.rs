//! Preview sinks: mirror what went on air to the log or a JSON-lines file.
//! Also home of the log-backed profanity alert.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use rds_core::{AlertSink, Preview, PreviewSink, ProfanityAlert, RdsError};

use crate::config::{PreviewConfig, PreviewKind};

/// Logs each accepted text at info level.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl PreviewSink for LogSink {
    async fn publish(&self, preview: &Preview) -> Result<(), RdsError> {
        info!(
            artist = %preview.artist,
            title = %preview.title,
            toggle = preview.toggle,
            "on air: {}",
            preview.text
        );
        Ok(())
    }
}

/// Appends one JSON object per accepted text.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PreviewSink for FileSink {
    async fn publish(&self, preview: &Preview) -> Result<(), RdsError> {
        let mut line = serde_json::to_vec(preview)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(&line).await {
                // reopen on the next publish
                *guard = None;
                return Err(e.into());
            }
            file.flush().await?;
        }
        Ok(())
    }
}

/// Logs the raw and filtered text of every track the filter touched.
#[derive(Debug, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn profanity(&self, alert: &ProfanityAlert) -> Result<(), RdsError> {
        warn!(
            original = %format!("{} - {}", alert.artist, alert.title),
            filtered = %alert.filtered,
            hits = alert.hits,
            dropped = alert.dropped,
            "profanity filtered"
        );
        Ok(())
    }
}

/// Build the sink named by the config, if any.
pub fn from_config(config: &PreviewConfig) -> Option<Arc<dyn PreviewSink>> {
    match config.sink {
        PreviewKind::None => None,
        PreviewKind::Log => Some(Arc::new(LogSink)),
        PreviewKind::File => Some(Arc::new(FileSink::new(&config.path))),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(text: &str) -> Preview {
        Preview {
            text: text.into(),
            artist: "OWL CITY".into(),
            title: "FIREFLIES".into(),
            toggle: true,
        }
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let path = std::env::temp_dir().join(format!("rds-preview-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let sink = FileSink::new(&path);
        sink.publish(&preview("OWL CITY - FIREFLIES")).await.unwrap();
        sink.publish(&preview("SECOND")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["text"], "OWL CITY - FIREFLIES");
        assert_eq!(first["toggle"], true);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn log_alerts_accepts_alerts() {
        let alert = ProfanityAlert {
            artist: "Band".into(),
            title: "Darn It".into(),
            filtered: "BAND - **** IT".into(),
            hits: 1,
            dropped: false,
        };
        assert!(LogAlerts.profanity(&alert).await.is_ok());
    }

    #[test]
    fn sink_from_config() {
        let mut config = PreviewConfig::default();
        assert!(from_config(&config).is_some());
        config.sink = PreviewKind::None;
        assert!(from_config(&config).is_none());
    }
}
