//! Text normalization: raw track metadata → broadcast-safe RadioText.
//!
//! [`Normalizer::normalize`] is total. Whatever comes in, the result is
//! uppercase printable ASCII of at most [`TEXT_MAX_LEN`] characters with no
//! `$`, `^` or backtick, plus the spans of the artist and title inside it so
//! RT+ tags can be computed against the exact string that goes on air.
//!
//! Steps run per field (artist and title are cleaned independently and
//! then joined with [`SEPARATOR`]), which gives the same text as composing
//! first because the separator survives every step unchanged:
//!
//! 1. metadata cleanup (optional)
//! 2. transliteration to ASCII
//! 3. stripping of characters outside the permitted set
//! 4. uppercasing
//! 5. profanity filtering
//! 6. composition and word-preserving truncation, title first

pub mod cleanup;
pub mod profanity;
pub mod transliterate;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::TEXT_MAX_LEN;

pub use profanity::{Denylist, Filtered, MASK_CHAR, ProfanityPolicy, WordList};

/// Joins artist and title.
pub const SEPARATOR: &str = " - ";

/// Characters the encoder mishandles even though the wire would carry them.
pub const DISALLOWED: &[char] = &['$', '^', '`'];

/// Punctuation allowed through besides ASCII letters and digits.
pub const PERMITTED_PUNCTUATION: &str = " !\"#%&'()*+,-./:;<=>?@[]_{|}~";

/// Trimmed off the end of a word-truncated field so it does not end on a
/// dangling connector.
const TRAILING_JUNK: &[char] = &[' ', '-', ',', ':', ';', '/', '&', '(', '+'];

// ── Config ───────────────────────────────────────────────────────

/// Which field comes first in the composed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayOrder {
    /// `ARTIST - TITLE`
    #[default]
    ArtistTitle,
    /// `TITLE - ARTIST`
    TitleArtist,
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub display_order: DisplayOrder,
    /// Sent when both fields are empty (or a track is dropped).
    pub idle_text: String,
    /// Strip streaming-metadata qualifiers before normalizing.
    pub cleanup: bool,
    /// Run the profanity filter at all.
    pub profanity_filter: bool,
    pub on_profanity: ProfanityPolicy,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            display_order: DisplayOrder::ArtistTitle,
            idle_text: String::new(),
            cleanup: true,
            profanity_filter: true,
            on_profanity: ProfanityPolicy::Mask,
        }
    }
}

// ── Output types ─────────────────────────────────────────────────

/// A byte range inside a [`NormalizedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Broadcast-ready text and where each field landed in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    artist: Option<Span>,
    title: Option<Span>,
    profanity_hits: usize,
    dropped: bool,
}

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Span of the artist inside the text, if any of it survived.
    pub fn artist_span(&self) -> Option<Span> {
        self.artist
    }

    /// Span of the title inside the text, if any of it survived.
    pub fn title_span(&self) -> Option<Span> {
        self.title
    }

    /// The artist as displayed.
    pub fn artist(&self) -> &str {
        self.artist.map_or("", |s| &self.text[s.start..s.end()])
    }

    /// The title as displayed.
    pub fn title(&self) -> &str {
        self.title.map_or("", |s| &self.text[s.start..s.end()])
    }

    /// Denied tokens found across both fields.
    pub fn profanity_hits(&self) -> usize {
        self.profanity_hits
    }

    /// `true` when the `drop_track` policy tripped; the text is the idle
    /// string and should not be sent.
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }
}

impl std::fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

// ── Normalizer ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Field {
    Artist,
    Title,
}

/// Stateless text pipeline; see the module docs for the steps.
#[derive(Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
    denylist: Arc<dyn Denylist>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig, denylist: Arc<dyn Denylist>) -> Self {
        Self { config, denylist }
    }

    /// A normalizer with an empty denylist.
    pub fn without_denylist(config: NormalizerConfig) -> Self {
        Self::new(config, Arc::new(WordList::empty()))
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize one artist/title pair.
    pub fn normalize(&self, artist: &str, title: &str) -> NormalizedText {
        let (artist, artist_hits) = self.sanitize(artist, Field::Artist);
        let (title, title_hits) = self.sanitize(title, Field::Title);
        let profanity_hits = artist_hits + title_hits;

        if profanity_hits > 0 && self.config.on_profanity == ProfanityPolicy::DropTrack {
            return NormalizedText {
                dropped: true,
                profanity_hits,
                ..self.idle()
            };
        }
        if artist.is_empty() && title.is_empty() {
            return self.idle();
        }

        let (artist, title) = fit(artist, title);
        let mut out = compose(&artist, &title, self.config.display_order);
        out.profanity_hits = profanity_hits;
        out
    }

    /// The idle text, itself sanitized.
    pub fn idle(&self) -> NormalizedText {
        let cleaned = strip_disallowed(&transliterate::transliterate(&self.config.idle_text));
        let text = truncate_words(&cleaned.to_ascii_uppercase(), TEXT_MAX_LEN);
        NormalizedText {
            text: text.trim_end().to_string(),
            artist: None,
            title: None,
            profanity_hits: 0,
            dropped: false,
        }
    }

    /// Steps 1–5 for one field.
    fn sanitize(&self, raw: &str, field: Field) -> (String, usize) {
        let cleaned = match (self.config.cleanup, field) {
            (true, Field::Artist) => cleanup::clean_artist(raw),
            (true, Field::Title) => cleanup::clean_title(raw),
            (false, _) => raw.to_string(),
        };
        let ascii = transliterate::transliterate(&cleaned);
        let stripped = strip_disallowed(&ascii);
        let upper = stripped.to_ascii_uppercase();

        if !self.config.profanity_filter {
            return (upper, 0);
        }
        let filtered = profanity::filter(&upper, self.denylist.as_ref(), self.config.on_profanity);
        (filtered.text.trim().to_string(), filtered.hits)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::without_denylist(NormalizerConfig::default())
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Keep ASCII letters, digits and permitted punctuation, then collapse
/// whitespace runs. Input is expected to be transliterated already.
pub fn strip_disallowed(s: &str) -> String {
    let kept: String = s
        .chars()
        .filter(|&c| {
            c.is_ascii_alphanumeric()
                || (PERMITTED_PUNCTUATION.contains(c) && !DISALLOWED.contains(&c))
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `s` to at most `max` bytes on a word boundary.
///
/// Returns an empty string when not even the first word fits. A hard cut
/// only happens when that word is itself longer than [`TEXT_MAX_LEN`].
pub fn truncate_words(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let head = &s[..max];
    let boundary = if s.as_bytes()[max] == b' ' {
        Some(max)
    } else {
        head.rfind(' ')
    };
    let words = boundary
        .map(|i| head[..i].trim_end_matches(TRAILING_JUNK))
        .filter(|words| !words.is_empty());
    match words {
        Some(words) => words.to_string(),
        None if first_token_len(s) > TEXT_MAX_LEN => head.trim_end().to_string(),
        None => String::new(),
    }
}

fn first_token_len(s: &str) -> usize {
    s.split(' ').next().map_or(0, str::len)
}

/// Shrink the pair until `artist - title` fits, cutting the title first.
fn fit(mut artist: String, mut title: String) -> (String, String) {
    if artist.is_empty() || title.is_empty() {
        return (
            truncate_words(&artist, TEXT_MAX_LEN),
            truncate_words(&title, TEXT_MAX_LEN),
        );
    }
    if artist.len() + SEPARATOR.len() + title.len() <= TEXT_MAX_LEN {
        return (artist, title);
    }

    let room = TEXT_MAX_LEN.saturating_sub(artist.len() + SEPARATOR.len());
    title = truncate_words(&title, room);
    if title.is_empty() {
        artist = truncate_words(&artist, TEXT_MAX_LEN);
    }
    (artist, title)
}

fn compose(artist: &str, title: &str, order: DisplayOrder) -> NormalizedText {
    let (first, second) = match order {
        DisplayOrder::ArtistTitle => (artist, title),
        DisplayOrder::TitleArtist => (title, artist),
    };

    let mut text = String::with_capacity(TEXT_MAX_LEN);
    let mut spans = [None, None];
    for (i, part) in [first, second].into_iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str(SEPARATOR);
        }
        spans[i] = Some(Span::new(text.len(), part.len()));
        text.push_str(part);
    }

    let (artist, title) = match order {
        DisplayOrder::ArtistTitle => (spans[0], spans[1]),
        DisplayOrder::TitleArtist => (spans[1], spans[0]),
    };
    NormalizedText {
        text,
        artist,
        title,
        profanity_hits: 0,
        dropped: false,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn title_first() -> Normalizer {
        Normalizer::without_denylist(NormalizerConfig {
            display_order: DisplayOrder::TitleArtist,
            ..Default::default()
        })
    }

    fn with_words(policy: ProfanityPolicy) -> Normalizer {
        Normalizer::new(
            NormalizerConfig {
                on_profanity: policy,
                ..Default::default()
            },
            Arc::new(WordList::from_words(["darn"])),
        )
    }

    const NASTY: &[(&str, &str)] = &[
        ("", ""),
        ("OWL CITY", "Fireflies"),
        ("Björk", "Jóga"),
        ("$uicideboy$", "^^^ `Backtick` ^^^"),
        ("A\tB\r\nC", "Line\nBreak"),
        ("坂本龍一", "戦場のメリークリスマス"),
        ("Кино", "Группа крови"),
        ("x", "Supercalifragilisticexpialidocious-Supercalifragilisticexpialidocious-Super"),
        (
            "The Artist With An Extraordinarily Long Name That Keeps Going On",
            "And A Title",
        ),
        ("\u{0007}\u{001b}[31m", "\u{007f}"),
    ];

    #[test]
    fn scenario_a_title_first() {
        let n = title_first().normalize("OWL CITY", "Fireflies");
        assert_eq!(n.as_str(), "FIREFLIES - OWL CITY");
        assert_eq!(n.title_span(), Some(Span::new(0, 9)));
        assert_eq!(n.artist_span(), Some(Span::new(12, 8)));
        assert_eq!(n.title(), "FIREFLIES");
        assert_eq!(n.artist(), "OWL CITY");
    }

    #[test]
    fn default_order_is_artist_first() {
        let n = Normalizer::default().normalize("OWL CITY", "Fireflies");
        assert_eq!(n.as_str(), "OWL CITY - FIREFLIES");
        assert_eq!(n.artist_span(), Some(Span::new(0, 8)));
        assert_eq!(n.title_span(), Some(Span::new(11, 9)));
    }

    #[test]
    fn invariants_hold_over_nasty_inputs() {
        let normalizers = [Normalizer::default(), title_first(), with_words(ProfanityPolicy::Omit)];
        for n in &normalizers {
            for &(artist, title) in NASTY {
                let out = n.normalize(artist, title);
                let again = n.normalize(artist, title);
                assert_eq!(out, again, "deterministic for {artist:?}/{title:?}");
                assert!(out.len() <= TEXT_MAX_LEN, "too long: {out:?}");
                assert!(out.as_str().bytes().all(|b| (0x20..0x7f).contains(&b)), "{out:?}");
                assert!(!out.as_str().contains(DISALLOWED), "{out:?}");
                assert_eq!(out.as_str(), out.as_str().to_ascii_uppercase());
                for span in [out.artist_span(), out.title_span()].into_iter().flatten() {
                    assert!(span.end() <= out.len(), "span past end: {out:?}");
                }
            }
        }
    }

    #[test]
    fn transliterates_and_strips() {
        let n = Normalizer::default().normalize("Björk", "$ave ^ The `Day`");
        assert_eq!(n.as_str(), "BJORK - AVE THE DAY");
    }

    #[test]
    fn unmapped_characters_vanish_without_placeholders() {
        let n = Normalizer::default().normalize("坂本龍一", "Merry Christmas");
        assert_eq!(n.as_str(), "MERRY CHRISTMAS");
        assert_eq!(n.artist_span(), None);
        assert_eq!(n.title_span(), Some(Span::new(0, 15)));
    }

    #[test]
    fn empty_fields() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("", "Solo Title").as_str(), "SOLO TITLE");
        assert_eq!(n.normalize("Solo Artist", "   ").as_str(), "SOLO ARTIST");
        let idle = n.normalize("", "");
        assert!(idle.is_empty());
        assert_eq!(idle.artist_span(), None);
        assert_eq!(idle.title_span(), None);
    }

    #[test]
    fn idle_text_is_configurable_and_sanitized() {
        let n = Normalizer::without_denylist(NormalizerConfig {
            idle_text: "wbor 91.1 fm – $tay tuned".into(),
            ..Default::default()
        });
        assert_eq!(n.normalize("", "").as_str(), "WBOR 91.1 FM - TAY TUNED");
    }

    #[test]
    fn long_idle_text_keeps_whole_words() {
        let n = Normalizer::without_denylist(NormalizerConfig {
            idle_text: "you are listening to the independent student radio station of the college".into(),
            ..Default::default()
        });
        let idle = n.idle();
        assert!(idle.len() <= TEXT_MAX_LEN);
        assert_eq!(
            idle.as_str(),
            "YOU ARE LISTENING TO THE INDEPENDENT STUDENT RADIO STATION OF"
        );
    }

    #[test]
    fn scenario_b_truncates_title_on_word_boundary() {
        let artist = "THE MIDNIGHT ORCHESTRA";
        let title = "A VERY LONG SONG TITLE THAT JUST KEEPS ON GOING AND GOING FOREVER";
        let composed = format!("{artist}{SEPARATOR}{title}");
        assert_eq!(composed.len(), 90);

        let n = Normalizer::default().normalize(artist, title);
        assert!(n.len() <= TEXT_MAX_LEN);
        assert_eq!(n.artist(), artist);
        assert_eq!(n.as_str(), "THE MIDNIGHT ORCHESTRA - A VERY LONG SONG TITLE THAT JUST KEEPS");
        // Every displayed title word is a whole word of the original.
        let words: Vec<&str> = title.split(' ').collect();
        assert!(n.title().split(' ').all(|w| words.contains(&w)));
        let span = n.title_span().unwrap();
        assert!(span.end() <= n.len());
    }

    #[test]
    fn hard_truncates_single_oversized_token() {
        let long = "X".repeat(80);
        let n = Normalizer::default().normalize(&long, "");
        assert_eq!(n.as_str(), "X".repeat(64));
        assert_eq!(n.artist_span(), Some(Span::new(0, 64)));
    }

    #[test]
    fn long_first_title_word_drops_title_instead_of_splitting() {
        let n = Normalizer::default().normalize(
            "THE MIDNIGHT ORCHESTRA FEATURING SOMEONE ELSE",
            "ANTIDISESTABLISHMENTARIANISM FOREVER",
        );
        assert!(n.len() <= TEXT_MAX_LEN);
        assert_eq!(n.title_span(), None);
        assert_eq!(n.as_str(), n.artist());
        assert!(!n.as_str().contains("ANTIDIS"));
    }

    #[test]
    fn huge_artist_drops_title() {
        let artist = "WORD ".repeat(13);
        let n = Normalizer::default().normalize(&artist, "Title");
        assert!(n.len() <= TEXT_MAX_LEN);
        assert_eq!(n.title_span(), None);
        assert!(!n.as_str().contains(SEPARATOR));
    }

    #[test]
    fn scenario_c_mask_policy() {
        let n = with_words(ProfanityPolicy::Mask).normalize("Darn Band", "Well darn it");
        assert_eq!(n.as_str(), "**** BAND - WELL **** IT");
        assert_eq!(n.profanity_hits(), 2);
        assert!(!n.is_dropped());

        let long_title = format!("darn {}", "WORDS ".repeat(12));
        let n = with_words(ProfanityPolicy::Mask).normalize("Artist", &long_title);
        assert!(n.len() <= TEXT_MAX_LEN);
        assert!(n.title().starts_with("****"));
    }

    #[test]
    fn omit_policy_removes_words() {
        let n = with_words(ProfanityPolicy::Omit).normalize("Band", "Well darn it");
        assert_eq!(n.as_str(), "BAND - WELL IT");
    }

    #[test]
    fn drop_track_policy_flags_track() {
        let n = with_words(ProfanityPolicy::DropTrack).normalize("Band", "Well darn it");
        assert!(n.is_dropped());
        assert_eq!(n.profanity_hits(), 1);
        assert!(n.is_empty());

        let clean = with_words(ProfanityPolicy::DropTrack).normalize("Band", "Well done");
        assert!(!clean.is_dropped());
    }

    #[test]
    fn filter_can_be_disabled() {
        let n = Normalizer::new(
            NormalizerConfig {
                profanity_filter: false,
                ..Default::default()
            },
            Arc::new(WordList::from_words(["darn"])),
        );
        assert_eq!(n.normalize("Band", "darn").as_str(), "BAND - DARN");
    }

    #[test]
    fn cleanup_runs_before_normalizing() {
        let n = Normalizer::default().normalize("Calvin Harris ft Rihanna", "This Is What You Came For (Explicit)");
        assert_eq!(n.as_str(), "CALVIN HARRIS FEAT. RIHANNA - THIS IS WHAT YOU CAME FOR");
    }

    #[test]
    fn truncate_words_helper() {
        assert_eq!(truncate_words("ONE TWO THREE", 9), "ONE TWO");
        assert_eq!(truncate_words("ONE TWO THREE", 7), "ONE TWO");
        assert_eq!(truncate_words("ONE - TWO", 6), "ONE");
        assert_eq!(truncate_words("ABCDEFGHIJ", 4), "");
        assert_eq!(truncate_words("- ABCDEFGH", 5), "");
        assert_eq!(truncate_words(&"X".repeat(70), 10), "X".repeat(10));
        assert_eq!(truncate_words("SHORT", 10), "SHORT");
        assert_eq!(truncate_words("ANY", 0), "");
    }
}
