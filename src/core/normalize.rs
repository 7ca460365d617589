//! Text cleanup applied before pre-tokenization.
//!
//! `encode` runs [`basic_clean`] (fixer, HTML unescape twice, trim) followed by
//! [`whitespace_clean`] and lowercasing. The fixer is pluggable through
//! [`TextFixer`] so callers can bring their own encoding repair.

use std::borrow::Cow;
use std::fmt;

use html_escape::decode_html_entities;
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Repairs encoding damage in raw input text.
///
/// Implementations must be deterministic: the same input always yields the same
/// output, or the BPE cache would serve stale results.
pub trait TextFixer: Send + Sync + fmt::Debug {
    fn fix_text<'a>(&self, text: &'a str) -> Cow<'a, str>;
}

/// Normalizes text to Unicode NFC. This is the default fixer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NfcFixer;

impl TextFixer for NfcFixer {
    fn fix_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if text.is_ascii() || is_nfc(text) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.nfc().collect())
        }
    }
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl TextFixer for Passthrough {
    fn fix_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }
}

/// Fix encoding, unescape HTML entities twice (for doubly-escaped input), and trim.
pub fn basic_clean(text: &str, fixer: &dyn TextFixer) -> String {
    let fixed = fixer.fix_text(text);
    let once = decode_html_entities(&fixed);
    let twice = decode_html_entities(&once);
    twice.trim().to_string()
}

/// Collapse every whitespace run to a single space and trim.
pub fn whitespace_clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_clean_named_entities() {
        assert_eq!(basic_clean("Tom &amp; Jerry", &Passthrough), "Tom & Jerry");
        assert_eq!(basic_clean("5 &lt; 10 &gt; 2", &Passthrough), "5 < 10 > 2");
        assert_eq!(basic_clean("caf&eacute;", &Passthrough), "caf\u{e9}");
        assert_eq!(basic_clean("I &hearts; it", &Passthrough), "I \u{2665} it");
    }

    #[test]
    fn test_basic_clean_numeric_entities() {
        assert_eq!(basic_clean("&#65;&#x42;", &Passthrough), "AB");
        assert_eq!(basic_clean("&#128512;", &Passthrough), "\u{1f600}");
    }

    #[test]
    fn test_basic_clean_keeps_plain_ampersand() {
        assert_eq!(basic_clean("AT&T", &Passthrough), "AT&T");
        assert_eq!(basic_clean("a & b", &Passthrough), "a & b");
    }

    #[test]
    fn test_basic_clean_unescapes_twice() {
        assert_eq!(basic_clean("  &amp;lt;b&amp;gt;  ", &Passthrough), "<b>");
    }

    #[test]
    fn test_whitespace_clean() {
        assert_eq!(whitespace_clean("Hello   World"), "Hello World");
        assert_eq!(whitespace_clean("\t a\n\n b \r\n"), "a b");
        assert_eq!(whitespace_clean("   "), "");
    }

    #[test]
    fn test_nfc_fixer_composes() {
        // e + combining acute accent
        let decomposed = "e\u{301}";
        assert_eq!(NfcFixer.fix_text(decomposed), "\u{e9}");
        assert!(matches!(NfcFixer.fix_text("abc"), Cow::Borrowed(_)));
    }
}
