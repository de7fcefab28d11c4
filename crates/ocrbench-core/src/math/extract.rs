//! Locate math spans in Markdown text.
//!
//! Recognized delimiters: `$$...$$`, `\[...\]`, `\(...\)` and `$...$`.
//! An escaped dollar (`\$`) is literal text.

/// One delimited equation in a rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    /// LaTeX between the delimiters, trimmed.
    pub latex: String,
    /// `$$` or `\[` (as opposed to inline `$` / `\(`).
    pub display: bool,
    /// Byte offset of the opening delimiter.
    pub offset: usize,
}

/// Find `close` at or after byte `from`, skipping backslash escapes so that
/// `\$` inside inline math does not end it.
fn find_closer(text: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i..].starts_with(close.as_bytes()) {
            return Some(i);
        }
        // `\\` and `\$` are single escaped units, except when the closer
        // itself starts with a backslash.
        if bytes[i] == b'\\' && !close.starts_with('\\') && i + 1 < bytes.len() {
            i += 2;
            continue;
        }
        if bytes[i] == b'\\' && close.starts_with('\\') && bytes.get(i + 1) == Some(&b'\\') {
            i += 2;
            continue;
        }
        i += 1;
    }
    None
}

/// All math spans in `text`, in order. Unterminated openers are ignored;
/// empty spans are dropped.
pub fn extract_math_spans(text: &str) -> Vec<MathSpan> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        // Byte-wise: every delimiter is ASCII, so `i` only ever lands on a
        // char boundary when a span is sliced out.
        let rest = &bytes[i..];
        let (open, close, display) = if rest.starts_with(b"$$") {
            ("$$", "$$", true)
        } else if rest.starts_with(b"\\[") {
            ("\\[", "\\]", true)
        } else if rest.starts_with(b"\\(") {
            ("\\(", "\\)", false)
        } else if rest.starts_with(b"\\\\") || rest.starts_with(b"\\$") {
            i += 2;
            continue;
        } else if rest.starts_with(b"$") {
            ("$", "$", false)
        } else {
            i += 1;
            continue;
        };

        let body_start = i + open.len();
        match find_closer(text, body_start, close) {
            Some(end) => {
                let latex = text[body_start..end].trim();
                // A blank line never occurs inside inline math.
                let plausible = display || !latex.contains("\n\n");
                if !latex.is_empty() && plausible {
                    spans.push(MathSpan {
                        latex: latex.to_string(),
                        display,
                        offset: i,
                    });
                }
                if plausible {
                    i = end + close.len();
                } else {
                    i = body_start;
                }
            }
            None => i = body_start,
        }
    }
    spans
}
