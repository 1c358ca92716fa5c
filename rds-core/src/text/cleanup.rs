//! Streaming-metadata cleanup applied before normalization.
//!
//! Playout systems hand us titles like `Fireflies (Remastered 2011)` or
//! `Song - Live at Wembley`, and artists spelled `A ft B`. These qualifiers
//! burn display space without telling the listener anything.

/// Words that make a qualifier removable when they open it.
const LEADING_KEYWORDS: &[&str] = &[
    "remaster",
    "remastered",
    "reissue",
    "reissued",
    "mono",
    "stereo",
    "deluxe",
    "bonus",
];

/// Removable only as the whole qualifier, e.g. `(Clean)`.
const STANDALONE_KEYWORDS: &[&str] = &["explicit", "clean", "live"];

/// Words that may follow a leading `live`.
const LIVE_FOLLOWERS: &[&str] = &["at", "from", "in", "on", "version", "session", "recording"];

/// Keywords allowed after a leading year, as in `2011 Remaster`.
const YEAR_FOLLOWERS: &[&str] = &["remaster", "remastered", "reissue", "reissued", "mix"];

/// Tokens normalized to `feat.` in artist names.
const FEATURE_TOKENS: &[&str] = &["ft", "ft.", "feat", "feat.", "featuring"];

/// Clean a track title.
pub fn clean_title(title: &str) -> String {
    let mut s = strip_invisible(title);

    loop {
        let trimmed = s.trim_end();
        let next = strip_bracketed_qualifier(trimmed)
            .or_else(|| strip_dash_qualifier(trimmed))
            .map(str::to_string);
        match next {
            Some(shorter) if !shorter.trim().is_empty() => s = shorter,
            _ => break,
        }
    }

    collapse_whitespace(&s)
}

/// Clean an artist name.
pub fn clean_artist(artist: &str) -> String {
    strip_invisible(artist)
        .split_whitespace()
        .map(|tok| {
            if FEATURE_TOKENS.contains(&tok.to_lowercase().as_str()) {
                "feat."
            } else {
                tok
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Internal ─────────────────────────────────────────────────────

/// Drop zero-width characters and turn non-breaking spaces into spaces.
fn strip_invisible(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(*c, '\u{200b}'..='\u{200d}' | '\u{2060}' | '\u{feff}'))
        .map(|c| if c == '\u{00a0}' || c == '\u{202f}' { ' ' } else { c })
        .collect()
}

/// Anchored match: the keyword has to open the qualifier, so
/// `(Clean Bandit Remix)` and `- Live Your Life Mix` are kept.
fn is_qualifier(inner: &str) -> bool {
    let lower = inner.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    match words.as_slice() {
        [] => false,
        [only] => STANDALONE_KEYWORDS.contains(only) || LEADING_KEYWORDS.contains(only),
        ["live", next, ..] => LIVE_FOLLOWERS.contains(next) || is_year(next),
        [year, next, ..] if is_year(year) => YEAR_FOLLOWERS.contains(next),
        [first, ..] => LEADING_KEYWORDS.contains(first),
    }
}

fn is_year(word: &str) -> bool {
    word.len() == 4 && word.bytes().all(|b| b.is_ascii_digit())
}

/// `Title (Remastered 2011)` → `Title`.
fn strip_bracketed_qualifier(s: &str) -> Option<&str> {
    let close = s.chars().last()?;
    let open = match close {
        ')' => '(',
        ']' => '[',
        _ => return None,
    };
    let start = s.rfind(open)?;
    let inner = &s[start + 1..s.len() - 1];
    is_qualifier(inner).then(|| &s[..start])
}

/// `Title - 2011 Remaster` → `Title`.
fn strip_dash_qualifier(s: &str) -> Option<&str> {
    let start = s.rfind(" - ")?;
    is_qualifier(&s[start + 3..]).then(|| &s[..start])
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bracketed_qualifiers() {
        assert_eq!(clean_title("Fireflies (Remastered 2011)"), "Fireflies");
        assert_eq!(clean_title("Song [Live]"), "Song");
        assert_eq!(clean_title("Song (Explicit) [Bonus Track]"), "Song");
    }

    #[test]
    fn keeps_meaningful_brackets() {
        assert_eq!(clean_title("Song (Interlude)"), "Song (Interlude)");
        assert_eq!(clean_title("(Sittin' On) The Dock"), "(Sittin' On) The Dock");
        assert_eq!(clean_title("Song (Oliver Remix)"), "Song (Oliver Remix)");
        assert_eq!(
            clean_title("Rockabye (Clean Bandit Remix)"),
            "Rockabye (Clean Bandit Remix)"
        );
        assert_eq!(clean_title("Song (Explicit Content Edit)"), "Song (Explicit Content Edit)");
    }

    #[test]
    fn strips_dash_qualifiers() {
        assert_eq!(clean_title("Heroes - 2017 Remaster"), "Heroes");
        assert_eq!(clean_title("Roxanne - Live at Wembley"), "Roxanne");
        assert_eq!(clean_title("Part 1 - Overture"), "Part 1 - Overture");
        assert_eq!(clean_title("Song - Live"), "Song");
        assert_eq!(clean_title("Song - Live 1979"), "Song");
    }

    #[test]
    fn keeps_dash_suffixes_that_only_contain_a_keyword() {
        assert_eq!(clean_title("Shine - Live Your Life Mix"), "Shine - Live Your Life Mix");
        assert_eq!(clean_title("Song - Clean Up Your Act"), "Song - Clean Up Your Act");
    }

    #[test]
    fn never_cleans_to_empty() {
        assert_eq!(clean_title("(Live)"), "(Live)");
    }

    #[test]
    fn normalizes_feature_tokens() {
        assert_eq!(clean_artist("Calvin Harris ft Rihanna"), "Calvin Harris feat. Rihanna");
        assert_eq!(clean_artist("A Featuring B"), "A feat. B");
        assert_eq!(clean_artist("Lefty"), "Lefty");
    }

    #[test]
    fn removes_invisible_characters() {
        assert_eq!(clean_title("Zero\u{200b}Width\u{00a0}Song"), "ZeroWidth Song");
        assert_eq!(clean_artist("\u{feff}Band"), "Band");
    }
}
