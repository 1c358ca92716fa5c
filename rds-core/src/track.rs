//! Inbound "now playing" events.

use std::time::Instant;

use serde::Deserialize;

use crate::error::RdsError;

/// One track change, consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub artist: String,
    pub title: String,
    /// Track length in seconds, when the source knows it.
    pub duration: Option<u64>,
    pub received_at: Instant,
}

/// Wire shape; fields may sit at top level or under `spin`.
#[derive(Debug, Default, Deserialize)]
struct RawEvent {
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    song: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    spin: Option<Box<RawEvent>>,
}

impl TrackEvent {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            duration: None,
            received_at: Instant::now(),
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Parse a JSON payload.
    ///
    /// Accepts `{"artist", "title" | "song", "duration"?}` directly or
    /// wrapped as `{"spin": {...}}`. Missing text fields become empty
    /// strings; a payload with neither artist nor title is rejected.
    pub fn from_json(payload: &str) -> Result<Self, RdsError> {
        let raw: RawEvent = serde_json::from_str(payload)?;
        let raw = match raw.spin {
            Some(inner) => *inner,
            None => raw,
        };

        let artist = raw.artist.unwrap_or_default();
        let title = raw.title.or(raw.song).unwrap_or_default();
        if artist.trim().is_empty() && title.trim().is_empty() {
            return Err(RdsError::InvalidPayload(
                "payload has neither artist nor title".into(),
            ));
        }

        let duration = raw
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64);

        Ok(Self {
            artist,
            title,
            duration,
            received_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_payload() {
        let ev = TrackEvent::from_json(r#"{"artist":"OWL CITY","title":"Fireflies"}"#).unwrap();
        assert_eq!(ev.artist, "OWL CITY");
        assert_eq!(ev.title, "Fireflies");
        assert_eq!(ev.duration, None);
    }

    #[test]
    fn parses_spin_payload_with_song_and_duration() {
        let ev = TrackEvent::from_json(
            r#"{"spin":{"artist":"Björk","song":"Jóga","duration":305.6},"extra":1}"#,
        )
        .unwrap();
        assert_eq!(ev.artist, "Björk");
        assert_eq!(ev.title, "Jóga");
        assert_eq!(ev.duration, Some(305));
    }

    #[test]
    fn one_field_is_enough() {
        let ev = TrackEvent::from_json(r#"{"title":"Station ID","duration":0}"#).unwrap();
        assert_eq!(ev.artist, "");
        assert_eq!(ev.duration, None);
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(matches!(
            TrackEvent::from_json(r#"{"artist":" ","title":""}"#),
            Err(RdsError::InvalidPayload(_))
        ));
        assert!(matches!(TrackEvent::from_json("not json"), Err(RdsError::Json(_))));
    }
}
