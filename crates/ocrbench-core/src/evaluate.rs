//! Per-fact evaluation against one rendering.
//!
//! [`evaluate_fact`] dispatches on the fact's kind. Work shared between facts
//! on the same page (normalizing the text, parsing tables, finding math
//! spans) happens once per [`PreparedRendering`].

use once_cell::unsync::OnceCell;

use crate::baseline::check_baseline;
use crate::facts::{Fact, FactKind, OrderFact, TextFact};
use crate::matching::{FuzzyMatch, effective_max_diffs, find_best_match, nearest_match};
use crate::math::{EquationCheck, MathSession, MathSpan, check_equation, extract_math_spans};
use crate::normalize::{char_window, normalize_text};
use crate::table::{TableGrid, evaluate_table, extract_tables};

/// Pass/fail for one fact against one rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub explanation: String,
    /// The fact is broken, not the rendering.
    pub fixture_error: bool,
}

impl Verdict {
    pub fn pass(explanation: impl Into<String>) -> Self {
        Self {
            passed: true,
            explanation: explanation.into(),
            fixture_error: false,
        }
    }

    pub fn fail(explanation: impl Into<String>) -> Self {
        Self {
            passed: false,
            explanation: explanation.into(),
            fixture_error: false,
        }
    }

    pub fn fixture(explanation: impl Into<String>) -> Self {
        Self {
            passed: false,
            explanation: explanation.into(),
            fixture_error: true,
        }
    }
}

/// A rendering plus lazily derived views of it.
pub struct PreparedRendering<'a> {
    text: &'a str,
    normalized: OnceCell<String>,
    lowered: OnceCell<String>,
    tables: OnceCell<Vec<TableGrid>>,
    spans: OnceCell<Vec<MathSpan>>,
}

impl<'a> PreparedRendering<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            normalized: OnceCell::new(),
            lowered: OnceCell::new(),
            tables: OnceCell::new(),
            spans: OnceCell::new(),
        }
    }

    pub fn text(&self) -> &str {
        self.text
    }

    pub fn normalized(&self) -> &str {
        self.normalized.get_or_init(|| normalize_text(self.text))
    }

    fn normalized_case(&self, case_sensitive: bool) -> &str {
        if case_sensitive {
            self.normalized()
        } else {
            self.lowered.get_or_init(|| self.normalized().to_lowercase())
        }
    }

    pub fn tables(&self) -> &[TableGrid] {
        self.tables.get_or_init(|| extract_tables(self.text))
    }

    pub fn math_spans(&self) -> &[MathSpan] {
        self.spans.get_or_init(|| extract_math_spans(self.text))
    }
}

/// Normalize fact text the same way as the rendering.
fn prepare_needle(text: &str, case_sensitive: bool) -> Vec<char> {
    let n = normalize_text(text);
    if case_sensitive {
        n.chars().collect()
    } else {
        n.to_lowercase().chars().collect()
    }
}

fn describe_closest(haystack: &[char], needle: &[char]) -> String {
    match nearest_match(haystack, needle) {
        Some(m) => format!(
            "closest: \"{}\" ({} edits)",
            m.snippet(haystack),
            m.distance
        ),
        None => "nothing similar".to_string(),
    }
}

fn describe_match(haystack: &[char], m: &FuzzyMatch) -> String {
    if m.distance == 0 {
        format!("\"{}\" at char {}", m.snippet(haystack), m.start)
    } else {
        format!(
            "\"{}\" at char {} ({} edits)",
            m.snippet(haystack),
            m.start,
            m.distance
        )
    }
}

fn eval_present(doc: &PreparedRendering<'_>, fact: &TextFact, expect_present: bool) -> Verdict {
    let window = char_window(
        doc.normalized_case(fact.case_sensitive),
        fact.first_n,
        fact.last_n,
    );
    let haystack: Vec<char> = window.chars().collect();
    let needle = prepare_needle(&fact.text, fact.case_sensitive);
    let k = effective_max_diffs(needle.len(), fact.max_diffs);
    let found = find_best_match(&haystack, &needle, fact.max_diffs);

    match (found, expect_present) {
        (Some(m), true) => Verdict::pass(format!("found {}", describe_match(&haystack, &m))),
        (None, true) => Verdict::fail(format!(
            "\"{}\" not found within {k} edits; {}",
            fact.text,
            describe_closest(&haystack, &needle)
        )),
        (Some(m), false) => Verdict::fail(format!(
            "\"{}\" should be absent but found {}",
            fact.text,
            describe_match(&haystack, &m)
        )),
        (None, false) => Verdict::pass(format!("\"{}\" absent (tolerance {k})", fact.text)),
    }
}

fn eval_order(doc: &PreparedRendering<'_>, fact: &OrderFact) -> Verdict {
    let haystack: Vec<char> = doc.normalized_case(fact.case_sensitive).chars().collect();
    let before = prepare_needle(&fact.before, fact.case_sensitive);
    let after = prepare_needle(&fact.after, fact.case_sensitive);

    let b = find_best_match(&haystack, &before, fact.before_max_diffs);
    let a = find_best_match(&haystack, &after, fact.after_max_diffs);

    match (b, a) {
        (None, _) => Verdict::fail(format!(
            "before text \"{}\" not found; {}",
            fact.before,
            describe_closest(&haystack, &before)
        )),
        (_, None) => Verdict::fail(format!(
            "after text \"{}\" not found; {}",
            fact.after,
            describe_closest(&haystack, &after)
        )),
        (Some(b), Some(a)) if b.end <= a.start => Verdict::pass(format!(
            "\"{}\" (chars {}..{}) precedes \"{}\" (chars {}..{})",
            fact.before, b.start, b.end, fact.after, a.start, a.end
        )),
        (Some(b), Some(a)) => Verdict::fail(format!(
            "\"{}\" found at chars {}..{} but \"{}\" starts at char {}",
            fact.before, b.start, b.end, fact.after, a.start
        )),
    }
}

fn eval_math(doc: &PreparedRendering<'_>, latex: &str, math: Option<&MathSession>) -> Verdict {
    let Some(session) = math else {
        return Verdict::fail("no math renderer available for this run");
    };
    match check_equation(session, doc.math_spans(), latex) {
        EquationCheck::Found { span, literal: true } => {
            Verdict::pass(format!("equation written identically: ${span}$"))
        }
        EquationCheck::Found { span, literal: false } => {
            Verdict::pass(format!("equation symbols found in ${span}$"))
        }
        EquationCheck::NoSpans => Verdict::fail("no math spans in rendering"),
        EquationCheck::NotFound {
            spans,
            unrenderable,
            closest,
            target_symbols,
        } => {
            let mut msg = format!("equation not found among {spans} math span(s)");
            if unrenderable > 0 {
                msg.push_str(&format!(", {unrenderable} of which failed to render"));
            }
            if let Some((span, n)) = closest {
                msg.push_str(&format!(
                    "; closest: ${span}$ ({n}/{target_symbols} symbols in order)"
                ));
            }
            Verdict::fail(msg)
        }
        EquationCheck::TargetInvalid(msg) => {
            Verdict::fixture(format!("target LaTeX does not render: {msg}"))
        }
        EquationCheck::TargetFailed(e) => Verdict::fail(format!("target render failed: {e}")),
    }
}

/// Check one fact against one rendering.
pub fn evaluate_fact(
    fact: &Fact,
    doc: &PreparedRendering<'_>,
    math: Option<&MathSession>,
) -> Verdict {
    match fact.kind() {
        FactKind::Present(t) => eval_present(doc, t, true),
        FactKind::Absent(t) => eval_present(doc, t, false),
        FactKind::Order(o) => eval_order(doc, o),
        FactKind::Table(t) => evaluate_table(doc.tables(), t),
        FactKind::Math(m) => eval_math(doc, &m.math, math),
        FactKind::Baseline(b) => check_baseline(doc.text(), b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::parse_fact;
    use crate::math::mock::MockRenderer;
    use std::sync::Arc;

    fn eval(json: &str, doc: &str) -> Verdict {
        let fact = parse_fact(json).unwrap();
        let session = MathSession::new(Arc::new(MockRenderer::new()), 1);
        evaluate_fact(&fact, &PreparedRendering::new(doc), Some(&session))
    }

    fn text_fact(kind: &str, text: &str, extra: &str) -> String {
        format!(
            r#"{{"pdf":"d.pdf","page":1,"id":"t","type":"{kind}","text":"{text}","max_diffs":0{extra}}}"#
        )
    }

    const DOC: &str = "The **quick** brown fox\u{2014}famous in tests\u{2014}jumps over the lazy dog.";

    // =========================================================================
    // present / absent
    // =========================================================================

    #[test]
    fn test_verbatim_text_present_and_not_absent() {
        for t in ["quick brown fox", "jumps over", "fox-famous in tests-jumps"] {
            assert!(eval(&text_fact("present", t, ""), DOC).passed, "{t}");
            assert!(!eval(&text_fact("absent", t, ""), DOC).passed, "{t}");
        }
    }

    #[test]
    fn test_missing_text_absent_and_not_present() {
        let v = eval(&text_fact("present", "purple elephant", ""), DOC);
        assert!(!v.passed);
        assert!(v.explanation.contains("not found"));
        assert!(eval(&text_fact("absent", "purple elephant", ""), DOC).passed);
    }

    #[test]
    fn test_fuzzy_tolerance() {
        let json = r#"{"pdf":"d.pdf","page":1,"id":"t","type":"present","text":"quikc brown","max_diffs":2}"#;
        assert!(eval(json, DOC).passed);
        let json = r#"{"pdf":"d.pdf","page":1,"id":"t","type":"present","text":"quikc brown","max_diffs":1}"#;
        assert!(!eval(json, DOC).passed);
    }

    #[test]
    fn test_case_insensitive_option() {
        assert!(!eval(&text_fact("present", "THE QUICK", ""), DOC).passed);
        assert!(eval(&text_fact("present", "THE QUICK", r#","case_sensitive":false"#), DOC).passed);
    }

    #[test]
    fn test_character_windows() {
        let doc = "Header line\n\nBody text in the middle of the page\n\nFooter 12";
        assert!(eval(&text_fact("present", "Header", r#","first_n":20"#), doc).passed);
        assert!(!eval(&text_fact("present", "Footer", r#","first_n":20"#), doc).passed);
        assert!(eval(&text_fact("present", "Footer 12", r#","last_n":12"#), doc).passed);
        assert!(eval(&text_fact("absent", "Body", r#","first_n":5,"last_n":5"#), doc).passed);
    }

    // =========================================================================
    // order
    // =========================================================================

    fn order(before: &str, after: &str) -> String {
        format!(
            r#"{{"pdf":"d.pdf","page":1,"id":"o","type":"order","before":"{before}","after":"{after}"}}"#
        )
    }

    #[test]
    fn test_order_pass_and_swap_fails() {
        let doc = "A sentence one. Sentence two follows.";
        assert!(eval(&order("sentence one", "Sentence two"), doc).passed);
        let v = eval(&order("Sentence two", "sentence one"), doc);
        assert!(!v.passed);
        assert!(v.explanation.contains("starts at char"));
    }

    #[test]
    fn test_order_missing_side() {
        let v = eval(&order("nowhere to be seen", "Sentence two"), "A sentence one. Sentence two follows.");
        assert!(!v.passed);
        assert!(v.explanation.starts_with("before text"));
    }

    // =========================================================================
    // table / math / baseline dispatch
    // =========================================================================

    #[test]
    fn test_table_dispatch() {
        let doc = "| Size | Words |\n|---|---|\n| 3.71T | 3.32T |\n";
        let json = r#"{"pdf":"d.pdf","page":1,"id":"t","type":"table","cell":"3.32T","left":"3.71T","top_heading":"Words"}"#;
        assert!(eval(json, doc).passed);
        let json = r#"{"pdf":"d.pdf","page":1,"id":"t","type":"table","cell":"3.32T","left":"Size"}"#;
        assert!(!eval(json, doc).passed);
    }

    #[test]
    fn test_math_without_renderer_fails() {
        let fact = parse_fact(r#"{"pdf":"d.pdf","page":1,"id":"m","type":"math","math":"x"}"#).unwrap();
        let v = evaluate_fact(&fact, &PreparedRendering::new("$x$"), None);
        assert!(!v.passed);
        assert!(!v.fixture_error);
    }

    #[test]
    fn test_math_literal_pass() {
        let json = r#"{"pdf":"d.pdf","page":1,"id":"m","type":"math","math":"a^2 + b^2"}"#;
        assert!(eval(json, "so $$a^2+b^2$$ holds").passed);
    }

    #[test]
    fn test_prepared_rendering_caches() {
        let doc = PreparedRendering::new("| a |\n|---|\n| 1 |\n$x$");
        let first = doc.tables().as_ptr();
        assert_eq!(doc.tables().as_ptr(), first);
        assert_eq!(doc.math_spans().len(), 1);
        assert_eq!(doc.normalized(), "| a | |---| | 1 | $x$");
    }
}
