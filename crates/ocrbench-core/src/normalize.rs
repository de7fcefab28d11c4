//! Canonical text form shared by every comparison.
//!
//! Fact text and candidate renderings must go through [`normalize_text`]
//! before any matching so that typographic variants (curly quotes, en dashes,
//! bold markers around a phrase) never turn into edit distance.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// `**bold**` / `__bold__` spans.
static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*|__([^_\s](?:.*?[^_\s])?)__").unwrap());

/// `*italic*` spans.
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());

/// HTML line breaks that OCR tools emit inside paragraphs and table cells.
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Map a single character to its canonical replacement.
///
/// Returns `None` for characters that are dropped entirely.
fn canonical_char(c: char) -> Option<&'static str> {
    match c {
        // Hyphens, dashes and minus signs
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => Some("-"),
        // Double quotes
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}'
        | '\u{2033}' | '\u{301D}' | '\u{301E}' | '\u{FF02}' => Some("\""),
        // Single quotes and apostrophes
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{2039}'
        | '\u{203A}' | '\u{02BC}' | '\u{FF07}' => Some("'"),
        '\u{2026}' => Some("..."),
        // Soft hyphen and zero-width characters carry no text
        '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => Some(""),
        _ => None,
    }
}

/// Replace dash/quote variants with their ASCII forms.
pub fn canonicalize_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match canonical_char(c) {
            Some(rep) => out.push_str(rep),
            None => out.push(c),
        }
    }
    out
}

/// Remove Markdown emphasis markers, keeping the emphasized text.
pub fn strip_emphasis(text: &str) -> String {
    let text = BOLD_RE.replace_all(text, |caps: &regex::Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });
    ITALIC_RE.replace_all(&text, "$1").into_owned()
}

/// Normalize text for comparison.
///
/// Steps (order matters):
/// 1. Dash, quote and apostrophe variants become ASCII; soft hyphens vanish
/// 2. Whitespace runs collapse to one space
/// 3. Strip Markdown bold/italic markers (on a single line, so every pair is consumed)
/// 4. `<br>` tags become spaces
/// 5. Unicode NFC
/// 6. Whitespace collapses again, ends trimmed
///
/// The result is a fixed point: `normalize_text(normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(text: &str) -> String {
    let text = canonicalize_punctuation(text);
    let text = WHITESPACE_RE.replace_all(&text, " ");
    let text = strip_emphasis(&text);
    let text = BR_RE.replace_all(&text, " ");
    let text: String = text.nfc().collect();
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Restrict `text` to its first `first_n` and/or last `last_n` characters.
///
/// With both limits the two windows are joined by a newline so that a match
/// cannot straddle the cut.
pub fn char_window(text: &str, first_n: Option<usize>, last_n: Option<usize>) -> String {
    let total = text.chars().count();
    let head = |n: usize| text.chars().take(n).collect::<String>();
    let tail = |n: usize| text.chars().skip(total.saturating_sub(n)).collect::<String>();
    match (first_n, last_n) {
        (None, None) => text.to_string(),
        (Some(f), None) => head(f),
        (None, Some(l)) => tail(l),
        (Some(f), Some(l)) => {
            if f + l >= total {
                text.to_string()
            } else {
                format!("{}\n{}", head(f), tail(l))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_variants_fold_to_ascii() {
        assert_eq!(normalize_text("state\u{2013}of\u{2014}the\u{2011}art"), "state-of-the-art");
        assert_eq!(normalize_text("a \u{2212} b"), "a - b");
    }

    #[test]
    fn test_non_ascii_and_ascii_hyphen_agree() {
        assert_eq!(
            normalize_text("well\u{2010}known"),
            normalize_text("well-known")
        );
    }

    #[test]
    fn test_quote_variants() {
        assert_eq!(normalize_text("\u{201C}quoted\u{201D}"), "\"quoted\"");
        assert_eq!(normalize_text("it\u{2019}s"), "it's");
        assert_eq!(normalize_text("\u{2018}single\u{2019}"), "'single'");
    }

    #[test]
    fn test_emphasis_markers_removed() {
        assert_eq!(normalize_text("a **bold** claim"), "a bold claim");
        assert_eq!(normalize_text("an *italic* word"), "an italic word");
        assert_eq!(normalize_text("__strong__ text"), "strong text");
    }

    #[test]
    fn test_snake_case_survives() {
        assert_eq!(normalize_text("call max_diffs_value here"), "call max_diffs_value here");
    }

    #[test]
    fn test_whitespace_and_breaks() {
        assert_eq!(normalize_text("  one\n\n two<br>three<BR/>four  "), "one two three four");
    }

    #[test]
    fn test_nfc_composition() {
        // e + combining acute composes to a single code point
        assert_eq!(normalize_text("caf\u{0065}\u{0301}"), "caf\u{00E9}");
    }

    #[test]
    fn test_soft_hyphen_dropped() {
        assert_eq!(normalize_text("hy\u{00AD}phen"), "hyphen");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Plain ASCII text.",
            "**Bold** and *italic* with \u{201C}quotes\u{201D} \u{2014} and dashes",
            "* a ** b *",
            "***triple***",
            "caf\u{0065}\u{0301} \u{2026} done",
            "line<br>break\tand   tabs",
            "a * b\nc * d",
            "<b*r*>",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_char_window() {
        let text = "abcdefghij";
        assert_eq!(char_window(text, Some(3), None), "abc");
        assert_eq!(char_window(text, None, Some(2)), "ij");
        assert_eq!(char_window(text, Some(2), Some(2)), "ab\nij");
        assert_eq!(char_window(text, Some(8), Some(8)), text);
        assert_eq!(char_window(text, None, None), text);
    }
}
