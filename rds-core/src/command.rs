//! SmartGen command verbs and the fail-closed command formatter.
//!
//! A [`ProtocolCommand`] can only be built through [`format`], so every
//! command that reaches the codec has already passed wire-syntax checks.

use std::fmt;

use crate::error::FormatError;

/// Maximum characters in a `TEXT=` value.
pub const TEXT_MAX_LEN: usize = 64;

/// Maximum characters in an `RT+TAG=` value.
///
/// The longest legal value, `04,63,63,01,63,31,1,255`, is 23 characters.
pub const RT_TAG_MAX_LEN: usize = 32;

/// Number of comma-separated fields in an `RT+TAG=` value.
pub const RT_TAG_FIELDS: usize = 8;

// ── Verb ─────────────────────────────────────────────────────────

/// Commands understood by the encoder that this crate emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// RadioText payload.
    Text,
    /// RT+ tag descriptor.
    RtTag,
}

impl Verb {
    /// Wire spelling of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Text => "TEXT",
            Verb::RtTag => "RT+TAG",
        }
    }

    /// Maximum value length for this verb.
    pub fn max_len(&self) -> usize {
        match self {
            Verb::Text => TEXT_MAX_LEN,
            Verb::RtTag => RT_TAG_MAX_LEN,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ProtocolCommand ──────────────────────────────────────────────

/// A validated `VERB=VALUE` command, ready for the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolCommand {
    verb: Verb,
    value: String,
}

impl ProtocolCommand {
    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The line without its terminator, e.g. `TEXT=HELLO`.
    pub fn to_line(&self) -> String {
        format!("{}={}", self.verb, self.value)
    }
}

impl fmt::Display for ProtocolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.verb, self.value)
    }
}

// ── Formatter ────────────────────────────────────────────────────

/// Validate `value` for `verb` and build a command.
///
/// Rejects line terminators, anything outside printable 7-bit ASCII, values
/// over the verb's length limit, and `RT+TAG` values that are not eight
/// comma-separated decimal fields.
pub fn format(verb: Verb, value: impl Into<String>) -> Result<ProtocolCommand, FormatError> {
    let value = value.into();

    for (index, &byte) in value.as_bytes().iter().enumerate() {
        if byte == b'\r' || byte == b'\n' {
            return Err(FormatError::ContainsTerminator { verb });
        }
        if !(0x20..=0x7e).contains(&byte) {
            return Err(FormatError::NonPrintable { verb, byte, index });
        }
    }

    if value.len() > verb.max_len() {
        return Err(FormatError::TooLong {
            verb,
            len: value.len(),
            max: verb.max_len(),
        });
    }

    if verb == Verb::RtTag {
        check_rt_tag_syntax(&value)?;
    }

    Ok(ProtocolCommand { verb, value })
}

fn check_rt_tag_syntax(value: &str) -> Result<(), FormatError> {
    let verb = Verb::RtTag;
    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() != RT_TAG_FIELDS {
        return Err(FormatError::Malformed {
            verb,
            reason: "expected eight comma-separated fields",
        });
    }
    if fields
        .iter()
        .any(|f| f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(FormatError::Malformed {
            verb,
            reason: "fields must be decimal numbers",
        });
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_text_line() {
        let cmd = format(Verb::Text, "OWL CITY - FIREFLIES").unwrap();
        assert_eq!(cmd.verb(), Verb::Text);
        assert_eq!(cmd.to_line(), "TEXT=OWL CITY - FIREFLIES");
        assert_eq!(cmd.to_string(), cmd.to_line());
    }

    #[test]
    fn empty_text_is_allowed() {
        let cmd = format(Verb::Text, "").unwrap();
        assert_eq!(cmd.to_line(), "TEXT=");
    }

    #[test]
    fn text_at_limit_passes_and_over_limit_fails() {
        assert!(format(Verb::Text, "A".repeat(64)).is_ok());
        let err = format(Verb::Text, "A".repeat(65)).unwrap_err();
        assert_eq!(
            err,
            FormatError::TooLong {
                verb: Verb::Text,
                len: 65,
                max: 64
            }
        );
    }

    #[test]
    fn rejects_terminators() {
        assert_eq!(
            format(Verb::Text, "A\r\nB").unwrap_err(),
            FormatError::ContainsTerminator { verb: Verb::Text }
        );
        assert!(format(Verb::Text, "A\nB").is_err());
    }

    #[test]
    fn rejects_non_ascii_and_control_bytes() {
        let err = format(Verb::Text, "BJÖRK").unwrap_err();
        assert!(matches!(err, FormatError::NonPrintable { index: 2, .. }));

        let err = format(Verb::Text, "TAB\tHERE").unwrap_err();
        assert!(matches!(err, FormatError::NonPrintable { byte: 0x09, .. }));

        assert!(format(Verb::Text, "DEL\x7f").is_err());
    }

    #[test]
    fn rt_tag_syntax_checked() {
        assert!(format(Verb::RtTag, "04,0,8,01,11,9,1,0").is_ok());
        assert!(format(Verb::RtTag, "04,0,8,01,11,9,1").is_err());
        assert!(format(Verb::RtTag, "04,0,8,01,11,X,1,0").is_err());
        assert!(format(Verb::RtTag, "04,0,8,01,,9,1,0").is_err());
        assert!(format(Verb::RtTag, "04,63,63,01,63,31,1,255,00,00").is_err());
    }

    #[test]
    fn verb_wire_names() {
        assert_eq!(Verb::Text.to_string(), "TEXT");
        assert_eq!(Verb::RtTag.to_string(), "RT+TAG");
    }
}
