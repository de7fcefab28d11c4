//! Equation checks against the real KaTeX engine.

use std::sync::Arc;

use ocrbench_core::math::{equation_present, symbols::mathml_symbols};
use ocrbench_core::{MathRenderer, MathSession, RenderError};
use ocrbench_katex::KatexRenderer;

fn session() -> MathSession {
    MathSession::new(Arc::new(KatexRenderer::default()), 1)
}

#[test]
fn renders_mathml() {
    let renderer = KatexRenderer::default();
    renderer.start().unwrap();
    let mathml = renderer.render_mathml(r"\frac{a}{b}").unwrap();
    assert!(mathml.contains("<math"), "{mathml}");
    assert!(mathml.contains("<mfrac>"), "{mathml}");
}

#[test]
fn annotation_is_not_a_symbol() {
    let renderer = KatexRenderer::default();
    let mathml = renderer.render_mathml(r"\alpha + 1").unwrap();
    let symbols: String = mathml_symbols(&mathml).into_iter().collect();
    assert_eq!(symbols, "α+1");
}

#[test]
fn invalid_latex_is_reported_as_such() {
    let renderer = KatexRenderer::default();
    assert!(matches!(
        renderer.render_mathml(r"\frac{a"),
        Err(RenderError::InvalidLatex(_))
    ));
    assert!(matches!(
        renderer.render_mathml(r"\notacommand{x}"),
        Err(RenderError::InvalidLatex(_))
    ));
    // The worker survives a parse error.
    assert!(renderer.render_mathml("y").is_ok());
}

#[test]
fn integrand_found_inside_integral() {
    let doc = r"The area is $$\int_a^b 3x^2\,dx$$ as shown.";
    let session = session();
    assert_eq!(equation_present(&session, doc, "3x^2"), Ok(true));
    assert_eq!(equation_present(&session, doc, r"\int_a^b 3x^2 dx"), Ok(true));
    assert_eq!(equation_present(&session, doc, r"dx \int"), Ok(false));
}

#[test]
fn different_markup_same_symbols() {
    let doc = r"Euler: \(e^{i\pi} + 1 = 0\)";
    let session = session();
    assert_eq!(equation_present(&session, doc, r"e^{i \pi}+1=0"), Ok(true));
    assert_eq!(equation_present(&session, doc, r"e^{\pi i}"), Ok(false));
}

#[test]
fn invalid_target_is_an_error() {
    let session = session();
    assert!(matches!(
        equation_present(&session, "$x$", r"\frac{"),
        Err(RenderError::InvalidLatex(_))
    ));
}

#[test]
fn restart_replaces_worker() {
    let renderer = KatexRenderer::default();
    assert!(renderer.render_mathml("a").is_ok());
    renderer.restart().unwrap();
    assert!(renderer.render_mathml("b").is_ok());
}

#[test]
fn concurrent_renders_share_one_worker() {
    let renderer = Arc::new(KatexRenderer::default());
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let r = renderer.clone();
            std::thread::spawn(move || {
                (0..5)
                    .map(|j| r.render_mathml(&format!("x_{{{i}}} + {j}")))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        for (j, mathml) in h.join().unwrap().into_iter().enumerate() {
            let symbols: String = mathml_symbols(&mathml.unwrap()).into_iter().collect();
            assert_eq!(symbols, format!("x{i}+{j}"));
        }
    }
}
