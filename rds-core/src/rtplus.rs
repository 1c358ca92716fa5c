//! RT+ tag encoding and decoding.
//!
//! One packet carries at most two tags. The SmartGen value layout is
//! `ct1,start1,len1,ct2,start2,len2,running,timeout`, with every field in
//! 0..=63 except `len2` (0..=31), `running` (0..=1) and `timeout` (minutes,
//! 0..=255, 0 meaning no timeout).
//!
//! The encoder flips the item-toggle bit on its own each time `RT+TAG` is
//! issued. [`ToggleState`] mirrors that bit: packets are built with
//! [`ToggleState::peek`] and the mirror only advances once the encoder has
//! acknowledged the tag.

use std::fmt;

use crate::command::{self, ProtocolCommand, Verb};
use crate::error::{FormatError, RdsError};
use crate::text::{NormalizedText, Span};

/// Upper bound for start offsets and first-tag lengths.
pub const MAX_FIELD: usize = 63;
/// Upper bound for the second tag's length.
pub const MAX_SECOND_LEN: usize = 31;
/// Upper bound for the item timeout in minutes.
pub const MAX_TIMEOUT_MINUTES: u64 = 255;

// ── ContentType ──────────────────────────────────────────────────

/// RT+ content classes this crate tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    /// Empty slot.
    Null = 0,
    /// ITEM.TITLE
    Title = 1,
    /// ITEM.ARTIST
    Artist = 4,
}

impl ContentType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Null),
            1 => Some(Self::Title),
            4 => Some(Self::Artist),
            _ => None,
        }
    }
}

// ── RtPlusTag ────────────────────────────────────────────────────

/// One tagged range of the RadioText.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPlusTag {
    pub content_type: ContentType,
    pub start: u8,
    pub len: u8,
}

impl RtPlusTag {
    pub const NULL: Self = Self {
        content_type: ContentType::Null,
        start: 0,
        len: 0,
    };

    pub fn is_null(&self) -> bool {
        self.content_type == ContentType::Null
    }

    pub fn span(&self) -> Span {
        Span::new(self.start as usize, self.len as usize)
    }
}

impl fmt::Display for RtPlusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("00,00,00")
        } else {
            write!(f, "{:02},{},{}", self.content_type.code(), self.start, self.len)
        }
    }
}

// ── ToggleState ──────────────────────────────────────────────────

/// Software mirror of the encoder's RT+ item-toggle bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToggleState(bool);

impl ToggleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> bool {
        self.0
    }

    /// The value the encoder holds after the next delivered `RT+TAG`.
    pub fn peek(&self) -> bool {
        !self.0
    }

    /// Record a delivered `RT+TAG` and return the new value.
    pub fn advance(&mut self) -> bool {
        self.0 = !self.0;
        self.0
    }
}

// ── Options ──────────────────────────────────────────────────────

/// Per-track packet flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPlusOptions {
    pub running: bool,
    pub timeout_minutes: u8,
}

impl Default for RtPlusOptions {
    fn default() -> Self {
        Self {
            running: true,
            timeout_minutes: 0,
        }
    }
}

impl RtPlusOptions {
    /// Running item whose tags expire after the track's duration.
    pub fn for_duration(duration_secs: Option<u64>) -> Self {
        Self {
            running: true,
            timeout_minutes: timeout_minutes(duration_secs),
        }
    }
}

/// Whole minutes of `duration_secs`, clamped to the field's range.
pub fn timeout_minutes(duration_secs: Option<u64>) -> u8 {
    let minutes = duration_secs.unwrap_or(0) / 60;
    minutes.min(MAX_TIMEOUT_MINUTES) as u8
}

// ── RtPlusPacket ─────────────────────────────────────────────────

/// A two-slot RT+ packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPlusPacket {
    pub first: RtPlusTag,
    pub second: RtPlusTag,
    pub running: bool,
    pub timeout_minutes: u8,
    /// Toggle value for the track; not transmitted.
    pub toggle: bool,
}

impl RtPlusPacket {
    /// The `RT+TAG=` value.
    pub fn value(&self) -> String {
        format!(
            "{},{},{},{}",
            self.first,
            self.second,
            u8::from(self.running),
            self.timeout_minutes
        )
    }

    pub fn to_command(&self) -> Result<ProtocolCommand, FormatError> {
        command::format(Verb::RtTag, self.value())
    }

    /// Parse an `RT+TAG=` value. The toggle bit is not on the wire and
    /// comes back `false`.
    pub fn parse(value: &str) -> Result<Self, RdsError> {
        let fields = value
            .split(',')
            .map(|f| f.trim().parse::<u16>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RdsError::InvalidRtPlus(format!("non-numeric field in `{value}`")))?;
        if fields.len() != command::RT_TAG_FIELDS {
            return Err(RdsError::InvalidRtPlus(format!(
                "expected {} fields, got {} in `{value}`",
                command::RT_TAG_FIELDS,
                fields.len()
            )));
        }

        let tag = |ct: u16, start: u16, len: u16, max_len: usize| {
            let content_type = u8::try_from(ct)
                .ok()
                .and_then(ContentType::from_code)
                .ok_or_else(|| RdsError::InvalidRtPlus(format!("unknown content type {ct}")))?;
            if start as usize > MAX_FIELD || len as usize > max_len {
                return Err(RdsError::InvalidRtPlus(format!(
                    "tag ({start}, {len}) out of range"
                )));
            }
            Ok(RtPlusTag {
                content_type,
                start: start as u8,
                len: len as u8,
            })
        };

        let first = tag(fields[0], fields[1], fields[2], MAX_FIELD)?;
        let second = tag(fields[3], fields[4], fields[5], MAX_SECOND_LEN)?;
        if first.is_null() {
            return Err(RdsError::InvalidRtPlus("first slot is empty".into()));
        }
        if fields[6] > 1 || fields[7] as u64 > MAX_TIMEOUT_MINUTES {
            return Err(RdsError::InvalidRtPlus(format!(
                "running/timeout out of range in `{value}`"
            )));
        }

        Ok(Self {
            first,
            second,
            running: fields[6] == 1,
            timeout_minutes: fields[7] as u8,
            toggle: false,
        })
    }

    pub fn tags(&self) -> impl Iterator<Item = &RtPlusTag> {
        [&self.first, &self.second].into_iter().filter(|t| !t.is_null())
    }
}

// ── Encoding ─────────────────────────────────────────────────────

/// Build the packets for one track. Empty when nothing is taggable.
pub fn packets(
    artist: Option<Span>,
    title: Option<Span>,
    text_len: usize,
    toggle: bool,
    options: RtPlusOptions,
) -> Vec<RtPlusPacket> {
    let mut tags = [(ContentType::Artist, artist), (ContentType::Title, title)]
        .into_iter()
        .filter_map(|(ct, span)| clamp(ct, span?, text_len));

    let Some(mut first) = tags.next() else {
        return Vec::new();
    };
    let mut second = tags.next().unwrap_or(RtPlusTag::NULL);

    if second.len as usize > MAX_SECOND_LEN {
        if (first.len as usize) <= MAX_SECOND_LEN {
            std::mem::swap(&mut first, &mut second);
        } else {
            second.len = MAX_SECOND_LEN as u8;
        }
    }

    vec![RtPlusPacket {
        first,
        second,
        running: options.running,
        timeout_minutes: options.timeout_minutes,
        toggle,
    }]
}

/// Build the `RT+TAG` commands for a normalized text.
pub fn encode(
    text: &NormalizedText,
    toggle: bool,
    options: RtPlusOptions,
) -> Result<Vec<ProtocolCommand>, FormatError> {
    packets(text.artist_span(), text.title_span(), text.len(), toggle, options)
        .iter()
        .map(RtPlusPacket::to_command)
        .collect()
}

/// Shrink a span to fit the transmitted text and the field ranges.
fn clamp(content_type: ContentType, span: Span, text_len: usize) -> Option<RtPlusTag> {
    if span.len == 0 || span.start >= text_len || span.start > MAX_FIELD {
        return None;
    }
    let len = span.len.min(text_len - span.start).min(MAX_FIELD);
    Some(RtPlusTag {
        content_type,
        start: span.start as u8,
        len: len as u8,
    })
}

// ── Decoding ─────────────────────────────────────────────────────

/// Artist and title recovered from an `RT+TAG` value and its TEXT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTags {
    pub artist: String,
    pub title: String,
}

/// Read back the tagged substrings of `text`.
pub fn decode_rt_plus(value: &str, text: &str) -> Result<DecodedTags, RdsError> {
    let packet = RtPlusPacket::parse(value)?;
    let mut decoded = DecodedTags::default();
    for tag in packet.tags() {
        let span = tag.span();
        let slice = text.get(span.start..span.end()).ok_or_else(|| {
            RdsError::InvalidRtPlus(format!(
                "tag ({}, {}) past end of {}-char text",
                span.start,
                span.len,
                text.len()
            ))
        })?;
        match tag.content_type {
            ContentType::Artist => decoded.artist = slice.to_string(),
            ContentType::Title => decoded.title = slice.to_string(),
            ContentType::Null => {}
        }
    }
    Ok(decoded)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{DisplayOrder, Normalizer, NormalizerConfig};

    fn title_first() -> Normalizer {
        Normalizer::without_denylist(NormalizerConfig {
            display_order: DisplayOrder::TitleArtist,
            ..Default::default()
        })
    }

    #[test]
    fn scenario_a_tags() {
        let text = title_first().normalize("OWL CITY", "Fireflies");
        let cmds = encode(&text, true, RtPlusOptions::default()).unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].to_line(), "RT+TAG=04,12,8,01,0,9,1,0");

        let decoded = decode_rt_plus(cmds[0].value(), text.as_str()).unwrap();
        assert_eq!(decoded.artist, "OWL CITY");
        assert_eq!(decoded.title, "FIREFLIES");
    }

    #[test]
    fn single_field_gets_blank_second_slot() {
        let text = Normalizer::default().normalize("", "Solo");
        let cmds = encode(&text, false, RtPlusOptions::default()).unwrap();
        assert_eq!(cmds[0].value(), "01,0,4,00,00,00,1,0");
    }

    #[test]
    fn nothing_to_tag_means_no_packet() {
        let text = Normalizer::default().normalize("", "");
        assert!(encode(&text, false, RtPlusOptions::default()).unwrap().is_empty());
        assert!(packets(Some(Span::new(70, 3)), None, 64, false, RtPlusOptions::default()).is_empty());
    }

    #[test]
    fn long_second_tag_swaps_with_short_first() {
        // artist 5 chars, title 40 chars
        let p = packets(
            Some(Span::new(0, 5)),
            Some(Span::new(8, 40)),
            48,
            false,
            RtPlusOptions::default(),
        );
        assert_eq!(p[0].first.content_type, ContentType::Title);
        assert_eq!(p[0].first.len, 40);
        assert_eq!(p[0].second.content_type, ContentType::Artist);
        assert_eq!(p[0].value(), "01,8,40,04,0,5,1,0");
    }

    #[test]
    fn both_long_clamps_second_length() {
        let p = packets(
            Some(Span::new(0, 32)),
            Some(Span::new(35, 29)),
            64,
            false,
            RtPlusOptions::default(),
        );
        assert_eq!(p[0].value(), "04,0,32,01,35,29,1,0");

        let p = packets(
            Some(Span::new(0, 32)),
            Some(Span::new(32, 32)),
            64,
            false,
            RtPlusOptions::default(),
        );
        assert_eq!(p[0].second.len as usize, MAX_SECOND_LEN);
    }

    #[test]
    fn tags_never_dangle_past_text() {
        let p = packets(
            Some(Span::new(0, 10)),
            Some(Span::new(13, 60)),
            40,
            false,
            RtPlusOptions::default(),
        );
        for tag in p[0].tags() {
            assert!(tag.span().end() <= 40);
        }
    }

    #[test]
    fn scenario_b_tags_fit_truncated_text() {
        let text = Normalizer::default().normalize(
            "THE MIDNIGHT ORCHESTRA",
            "A VERY LONG SONG TITLE THAT JUST KEEPS ON GOING AND GOING FOREVER",
        );
        let cmds = encode(&text, true, RtPlusOptions::default()).unwrap();
        let packet = RtPlusPacket::parse(cmds[0].value()).unwrap();
        for tag in packet.tags() {
            assert!(tag.span().end() <= text.len());
        }
        let decoded = decode_rt_plus(cmds[0].value(), text.as_str()).unwrap();
        assert_eq!(decoded.artist, "THE MIDNIGHT ORCHESTRA");
        assert!(text.title().starts_with(&decoded.title));
    }

    #[test]
    fn timeout_from_duration() {
        assert_eq!(timeout_minutes(None), 0);
        assert_eq!(timeout_minutes(Some(59)), 0);
        assert_eq!(timeout_minutes(Some(245)), 4);
        assert_eq!(timeout_minutes(Some(60 * 1000)), 255);
        let opts = RtPlusOptions::for_duration(Some(180));
        let p = packets(Some(Span::new(0, 3)), None, 3, false, opts);
        assert_eq!(p[0].value(), "04,0,3,00,00,00,1,3");
    }

    #[test]
    fn toggle_flips_once_per_track() {
        let mut toggle = ToggleState::new();
        assert!(toggle.peek());
        assert!(!toggle.value());
        let first = toggle.advance();
        let pkts = packets(Some(Span::new(0, 3)), Some(Span::new(6, 3)), 9, first, RtPlusOptions::default());
        assert!(pkts.iter().all(|p| p.toggle == first));
        let second = toggle.advance();
        assert_ne!(first, second);
        assert_eq!(toggle.value(), second);
    }

    #[test]
    fn parse_rejects_bad_values() {
        assert!(RtPlusPacket::parse("04,0,8,01,11,9,1").is_err());
        assert!(RtPlusPacket::parse("07,0,8,01,11,9,1,0").is_err());
        assert!(RtPlusPacket::parse("04,0,8,01,11,32,1,0").is_err());
        assert!(RtPlusPacket::parse("04,64,8,01,11,9,1,0").is_err());
        assert!(RtPlusPacket::parse("00,00,00,01,11,9,1,0").is_err());
        assert!(RtPlusPacket::parse("04,0,8,01,11,9,2,0").is_err());
        assert!(RtPlusPacket::parse("04,0,x,01,11,9,1,0").is_err());
    }

    #[test]
    fn decode_rejects_out_of_bounds_tag() {
        let err = decode_rt_plus("04,0,8,01,11,9,1,0", "SHORT").unwrap_err();
        assert!(matches!(err, RdsError::InvalidRtPlus(_)));
    }
}
