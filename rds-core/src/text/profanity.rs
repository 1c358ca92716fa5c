//! Whole-word profanity filtering.
//!
//! The wordlist sits behind the [`Denylist`] trait so the normalizer never
//! cares where words come from. [`WordList`] is the stock implementation,
//! loaded from a JSON array (the `words.json` format) or a plain text file
//! with one word per line.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RdsError;

/// Character used by [`ProfanityPolicy::Mask`].
pub const MASK_CHAR: char = '*';

// ── Denylist ─────────────────────────────────────────────────────

/// Lookup table consulted once per token.
pub trait Denylist: Send + Sync {
    /// `true` if `token` must not go on air. Matching is case-insensitive.
    fn is_denied(&self, token: &str) -> bool;
}

impl<F> Denylist for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_denied(&self, token: &str) -> bool {
        self(token)
    }
}

// ── ProfanityPolicy ──────────────────────────────────────────────

/// What to do with a denied token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfanityPolicy {
    /// Remove the token and the whitespace around it.
    Omit,
    /// Replace every character of the token with [`MASK_CHAR`].
    #[default]
    Mask,
    /// Leave the text alone and flag the whole track for dropping.
    DropTrack,
}

// ── WordList ─────────────────────────────────────────────────────

/// A set of lowercase denied words.
#[derive(Debug, Clone, Default)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_ascii_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    /// Parse a JSON array of strings.
    pub fn from_json(json: &str) -> Result<Self, RdsError> {
        let words: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::from_words(words))
    }

    /// Parse one word per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Self {
        Self::from_words(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    /// Load a wordlist file, choosing the parser by extension.
    ///
    /// Errors are logged and yield an empty list, so a bad file degrades
    /// filtering instead of stopping playout.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("cannot read wordlist {}: {e}; filtering disabled", path.display());
                return Self::empty();
            }
        };
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let list = if is_json {
            Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::error!("invalid wordlist {}: {e}; filtering disabled", path.display());
                Self::empty()
            })
        } else {
            Self::from_lines(&contents)
        };
        tracing::info!("loaded {} denied words from {}", list.len(), path.display());
        list
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Denylist for WordList {
    fn is_denied(&self, token: &str) -> bool {
        self.words.contains(&token.to_ascii_lowercase())
    }
}

// ── Filtering ────────────────────────────────────────────────────

/// Result of running the filter over one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub text: String,
    /// Number of denied tokens found.
    pub hits: usize,
}

/// Filter whole words of `text`.
///
/// Tokens are maximal runs of ASCII letters and digits, so `GRASS` never
/// matches a denied `ASS`. Under [`ProfanityPolicy::Mask`] the output has
/// exactly the input's length; under `Omit` it is never longer.
pub fn filter(text: &str, denylist: &dyn Denylist, policy: ProfanityPolicy) -> Filtered {
    let mut out = String::with_capacity(text.len());
    let mut hits = 0;
    let mut rest = text;

    while !rest.is_empty() {
        let token_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        if token_len == 0 {
            // Non-word character: copy one char through.
            let c = rest.chars().next().unwrap_or(' ');
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let token = &rest[..token_len];
        if denylist.is_denied(token) {
            hits += 1;
            match policy {
                ProfanityPolicy::Mask => {
                    out.extend(std::iter::repeat_n(MASK_CHAR, token.len()));
                }
                ProfanityPolicy::Omit => {}
                ProfanityPolicy::DropTrack => out.push_str(token),
            }
        } else {
            out.push_str(token);
        }
        rest = &rest[token_len..];
    }

    if policy == ProfanityPolicy::Omit && hits > 0 {
        out = out.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    Filtered { text: out, hits }
}

// ── Tests ────────────────────────────────────────────────────────
