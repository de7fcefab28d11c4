//! Mock math renderer for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::renderer::{MathRenderer, RenderError};

/// A canned reply from [`MockRenderer`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    MathMl(String),
    Error(RenderError),
}

/// A hand-rolled [`MathRenderer`] for tests.
///
/// Unless told otherwise it "renders" LaTeX by turning every non-blank
/// character into its own `<mi>`. Per-expression replies can be queued with
/// [`with_sequence()`](MockRenderer::with_sequence) (each call consumes one,
/// then the default takes over) or fixed with
/// [`with_mathml()`](MockRenderer::with_mathml).
pub struct MockRenderer {
    queued: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    fixed: HashMap<String, String>,
    start_error: Option<String>,
    calls: AtomicUsize,
    restarts: AtomicUsize,
    starts: AtomicUsize,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            fixed: HashMap::new(),
            start_error: None,
            calls: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
        }
    }

    /// Reply to `latex` with `responses` in order, then fall back.
    pub fn with_sequence(self, latex: &str, responses: Vec<MockResponse>) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(latex.to_string(), responses.into());
        self
    }

    /// Always reply to `latex` with `mathml`.
    pub fn with_mathml(mut self, latex: &str, mathml: &str) -> Self {
        self.fixed.insert(latex.to_string(), mathml.to_string());
        self
    }

    /// Make [`MathRenderer::start`] fail.
    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

/// One `<mi>` per non-blank character.
pub fn literal_mathml(latex: &str) -> String {
    let mut out = String::from("<math><mrow>");
    for c in latex.chars().filter(|c| !c.is_whitespace()) {
        match c {
            '<' => out.push_str("<mo>&lt;</mo>"),
            '>' => out.push_str("<mo>&gt;</mo>"),
            '&' => out.push_str("<mo>&amp;</mo>"),
            _ => {
                out.push_str("<mi>");
                out.push(c);
                out.push_str("</mi>");
            }
        }
    }
    out.push_str("</mrow></math>");
    out
}

impl MathRenderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    fn start(&self) -> Result<(), RenderError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match &self.start_error {
            Some(msg) => Err(RenderError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }

    fn render_mathml(&self, latex: &str) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(latex)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(MockResponse::MathMl(m)) => Ok(m),
            Some(MockResponse::Error(e)) => Err(e),
            None => Ok(self
                .fixed
                .get(latex)
                .cloned()
                .unwrap_or_else(|| literal_mathml(latex))),
        }
    }

    fn restart(&self) -> Result<(), RenderError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
