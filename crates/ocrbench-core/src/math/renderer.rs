//! Math typesetting engine seam and the per-run session around it.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use super::symbols::mathml_symbols;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The LaTeX itself is rejected by the engine.
    #[error("invalid LaTeX: {0}")]
    InvalidLatex(String),
    #[error("render timed out after {0:?}")]
    Timeout(Duration),
    #[error("renderer crashed: {0}")]
    Crashed(String),
    /// The engine cannot be started at all.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

impl RenderError {
    /// Timeouts and crashes may go away with a fresh engine.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::Timeout(_) | RenderError::Crashed(_))
    }
}

/// A headless math typesetting engine producing MathML.
///
/// Implementations own an expensive process or runtime. They are started once
/// per run and must release it when dropped.
pub trait MathRenderer: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the engine up. Called once, before the first render.
    fn start(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Render `latex` (display style) to MathML.
    fn render_mathml(&self, latex: &str) -> Result<String, RenderError>;

    /// Replace a stuck or crashed engine with a fresh one.
    fn restart(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Shared renderer handle for one benchmark run.
///
/// Starts the engine lazily, retries a timed-out or crashed render after a
/// restart, and memoizes symbol sequences (errors included) by LaTeX source.
pub struct MathSession {
    renderer: Arc<dyn MathRenderer>,
    retries: u32,
    started: OnceLock<Result<(), RenderError>>,
    cache: DashMap<String, Result<Arc<Vec<char>>, RenderError>>,
}

impl MathSession {
    pub fn new(renderer: Arc<dyn MathRenderer>, retries: u32) -> Self {
        Self {
            renderer,
            retries,
            started: OnceLock::new(),
            cache: DashMap::new(),
        }
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    /// Start the engine if it is not running yet. The outcome of the first
    /// attempt is remembered.
    pub fn ensure_started(&self) -> Result<(), RenderError> {
        self.started
            .get_or_init(|| {
                let result = self.renderer.start();
                match &result {
                    Ok(()) => tracing::info!(renderer = self.renderer.name(), "math renderer started"),
                    Err(e) => tracing::error!(renderer = self.renderer.name(), error = %e, "math renderer failed to start"),
                }
                result
            })
            .clone()
    }

    /// Symbol sequence of `latex`, rendering it on first use.
    pub fn symbols(&self, latex: &str) -> Result<Arc<Vec<char>>, RenderError> {
        let key = latex.trim();
        if let Some(hit) = self.cache.get(key) {
            return hit.value().clone();
        }
        let result = self.render_symbols(key);
        self.cache.insert(key.to_string(), result.clone());
        result
    }

    fn render_symbols(&self, latex: &str) -> Result<Arc<Vec<char>>, RenderError> {
        self.ensure_started()?;
        let mut attempt = 0;
        loop {
            match self.renderer.render_mathml(latex) {
                Ok(mathml) => return Ok(Arc::new(mathml_symbols(&mathml))),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        renderer = self.renderer.name(),
                        error = %e,
                        attempt,
                        "render failed; restarting renderer"
                    );
                    self.renderer.restart()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Number of distinct LaTeX sources seen so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::mock::{MockRenderer, MockResponse};

    #[test]
    fn test_symbols_memoized() {
        let mock = Arc::new(MockRenderer::new());
        let session = MathSession::new(mock.clone(), 1);
        let a = session.symbols("x+1").unwrap();
        let b = session.symbols(" x+1 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(session.cached(), 1);
    }

    #[test]
    fn test_timeout_retried_once_after_restart() {
        let mock = Arc::new(MockRenderer::new().with_sequence(
            "slow",
            vec![MockResponse::Error(RenderError::Timeout(Duration::from_secs(1)))],
        ));
        let session = MathSession::new(mock.clone(), 1);
        let syms = session.symbols("slow").unwrap();
        assert_eq!(syms.iter().collect::<String>(), "slow");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.restart_count(), 1);
    }

    #[test]
    fn test_repeated_crash_gives_up() {
        let crash = MockResponse::Error(RenderError::Crashed("boom".into()));
        let mock = Arc::new(MockRenderer::new().with_sequence("bad", vec![crash.clone(), crash]));
        let session = MathSession::new(mock.clone(), 1);
        assert!(matches!(session.symbols("bad"), Err(RenderError::Crashed(_))));
        assert_eq!(mock.call_count(), 2);
        // Cached: no third attempt.
        assert!(session.symbols("bad").is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn test_invalid_latex_not_retried() {
        let mock = Arc::new(MockRenderer::new().with_sequence(
            r"\frac{",
            vec![MockResponse::Error(RenderError::InvalidLatex("unexpected end".into()))],
        ));
        let session = MathSession::new(mock.clone(), 3);
        assert!(matches!(session.symbols(r"\frac{"), Err(RenderError::InvalidLatex(_))));
        assert_eq!(mock.restart_count(), 0);
    }

    #[test]
    fn test_start_failure_remembered() {
        let mock = Arc::new(MockRenderer::new().failing_start("no engine"));
        let session = MathSession::new(mock.clone(), 1);
        assert!(matches!(session.ensure_started(), Err(RenderError::Unavailable(_))));
        assert!(session.symbols("x").is_err());
        assert_eq!(mock.start_count(), 1);
        assert_eq!(mock.call_count(), 0);
    }
}
