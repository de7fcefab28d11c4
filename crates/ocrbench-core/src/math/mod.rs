//! Equation presence: does a target LaTeX expression appear among a
//! rendering's math spans?
//!
//! Both sides are typeset to MathML and flattened into symbol sequences; the
//! target is present when some span contains all of its symbols in the same
//! relative order. The target is always typeset, so broken LaTeX is caught
//! even when copied verbatim; a span written identically to it (ignoring
//! whitespace) is then accepted without typesetting any span.

pub mod extract;
pub mod mock;
pub mod renderer;
pub mod symbols;

pub use extract::{MathSpan, extract_math_spans};
pub use renderer::{MathRenderer, MathSession, RenderError};

use symbols::is_ordered_subsequence;

/// Outcome of looking for one equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquationCheck {
    Found {
        span: String,
        /// Matched textually, no span rendered.
        literal: bool,
    },
    NotFound {
        spans: usize,
        /// Spans the engine could not typeset.
        unrenderable: usize,
        /// Span covering the most target symbols, with that count.
        closest: Option<(String, usize)>,
        target_symbols: usize,
    },
    NoSpans,
    /// The target itself does not typeset: a broken fact.
    TargetInvalid(String),
    /// The engine failed on the target (timeout, crash).
    TargetFailed(RenderError),
}

/// Drop `$`, `$$`, `\[`/`\]` or `\(`/`\)` around a LaTeX string.
pub fn strip_delimiters(latex: &str) -> &str {
    let s = latex.trim();
    for (open, close) in [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")] {
        if s.len() >= open.len() + close.len()
            && let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    s
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// How many target symbols a greedy in-order scan of `candidate` covers.
fn covered(target: &[char], candidate: &[char]) -> usize {
    let mut it = candidate.iter();
    target
        .iter()
        .take_while(|t| it.any(|c| c == *t))
        .count()
}

/// Look for `target` among `spans`.
pub fn check_equation(session: &MathSession, spans: &[MathSpan], target: &str) -> EquationCheck {
    let target = strip_delimiters(target);
    let literal = squash(target);
    let literal_span = spans.iter().find(|s| squash(&s.latex) == literal);
    let found_literally = |span: &MathSpan| EquationCheck::Found {
        span: span.latex.clone(),
        literal: true,
    };

    let target_syms = match session.symbols(target) {
        Ok(s) => s,
        Err(RenderError::InvalidLatex(msg)) => return EquationCheck::TargetInvalid(msg),
        Err(e) => {
            // Engine trouble says nothing about a verbatim copy.
            return match literal_span {
                Some(span) => found_literally(span),
                None => EquationCheck::TargetFailed(e),
            };
        }
    };
    if target_syms.is_empty() {
        return EquationCheck::TargetInvalid("renders to no visible symbols".to_string());
    }
    if let Some(span) = literal_span {
        return found_literally(span);
    }
    if spans.is_empty() {
        return EquationCheck::NoSpans;
    }

    let mut unrenderable = 0;
    let mut closest: Option<(String, usize)> = None;
    for span in spans {
        let syms = match session.symbols(&span.latex) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(span = %span.latex, error = %e, "candidate span did not render");
                unrenderable += 1;
                continue;
            }
        };
        if is_ordered_subsequence(&target_syms, &syms) {
            return EquationCheck::Found {
                span: span.latex.clone(),
                literal: false,
            };
        }
        let n = covered(&target_syms, &syms);
        if closest.as_ref().is_none_or(|(_, best)| n > *best) {
            closest = Some((span.latex.clone(), n));
        }
    }

    EquationCheck::NotFound {
        spans: spans.len(),
        unrenderable,
        closest,
        target_symbols: target_syms.len(),
    }
}

/// `true` when `target` occurs among the math spans of `document`.
///
/// Errors only when the target itself cannot be typeset.
pub fn equation_present(
    session: &MathSession,
    document: &str,
    target: &str,
) -> Result<bool, RenderError> {
    match check_equation(session, &extract_math_spans(document), target) {
        EquationCheck::Found { .. } => Ok(true),
        EquationCheck::NotFound { .. } | EquationCheck::NoSpans => Ok(false),
        EquationCheck::TargetInvalid(msg) => Err(RenderError::InvalidLatex(msg)),
        EquationCheck::TargetFailed(e) => Err(e),
    }
}
