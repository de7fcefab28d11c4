use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod aggregate;
pub mod baseline;
pub mod candidate;
pub mod config_file;
pub mod evaluate;
pub mod facts;
pub mod factset;
pub mod matching;
pub mod math;
pub mod normalize;
pub mod pool;
pub mod runner;
pub mod stats;
pub mod table;

// Re-export for convenience
pub use aggregate::{BenchmarkSummary, RateStat, SourceSummary, summarize};
pub use candidate::{AdapterError, DirectoryCandidate, InMemoryCandidate, RenderingSource};
pub use facts::{Fact, FactError, FactKind, FactType, RawFact};
pub use factset::{FactSet, LineError, load_fact_set, save_facts};
pub use math::renderer::{MathRenderer, MathSession, RenderError};
pub use normalize::normalize_text;
pub use stats::ConfidenceInterval;
pub use table::{TableGrid, extract_tables};

/// Outcome of checking one fact against one candidate's rendering(s) of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub fact_id: String,
    pub pdf: String,
    pub page: u32,
    pub fact_type: FactType,
    pub passed: bool,
    /// Fraction of repeats that passed (0 or 1 with a single rendering).
    pub score: f64,
    pub explanation: String,
    /// The fact itself is broken (e.g. its LaTeX does not render). Such
    /// results are reported but kept out of pass rates.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixture_error: bool,
}

impl EvaluationResult {
    /// A failing result that never reached an evaluator.
    pub fn failed(fact: &Fact, explanation: impl Into<String>) -> Self {
        Self {
            fact_id: fact.id.clone(),
            pdf: fact.pdf.clone(),
            page: fact.page,
            fact_type: fact.fact_type(),
            passed: false,
            score: 0.0,
            explanation: explanation.into(),
            fixture_error: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("math renderer unavailable: {0}")]
    Renderer(#[from] RenderError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Progress events emitted while a candidate is evaluated.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PageStarted {
        index: usize,
        total: usize,
        pdf: String,
        page: u32,
    },
    PageFinished {
        index: usize,
        total: usize,
        pdf: String,
        page: u32,
        passed: usize,
        failed: usize,
    },
    /// The candidate could not provide a rendering; every fact on the page fails.
    AdapterFailed {
        pdf: String,
        page: u32,
        message: String,
    },
}

/// Configuration for a benchmark run.
#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: usize,
    pub bootstrap_samples: usize,
    pub confidence_level: f64,
    pub seed: u64,
    pub render_timeout_secs: u64,
    /// Extra attempts after a renderer timeout or crash.
    pub render_retries: u32,
    /// A fact passes when more than this fraction of repeats pass.
    pub pass_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: 4,
            bootstrap_samples: 1000,
            confidence_level: 0.95,
            seed: 42,
            render_timeout_secs: 10,
            render_retries: 1,
            pass_threshold: 0.5,
        }
    }
}

/// Evaluate every fact against one candidate.
///
/// Pages are evaluated concurrently on `config.num_workers` workers. Results
/// come back in the order of `facts`. Progress events are emitted via the
/// callback; cancelling the token fails the pages that have not started.
pub async fn evaluate_candidate(
    facts: &[Fact],
    source: std::sync::Arc<dyn RenderingSource>,
    math: Option<std::sync::Arc<MathSession>>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Vec<EvaluationResult>, CoreError> {
    runner::evaluate_candidate(facts, source, math, config, progress, cancel).await
}
