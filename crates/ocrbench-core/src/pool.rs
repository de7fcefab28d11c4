//! Worker pool for page evaluation.
//!
//! Architecture: `num_workers` coordinator tasks pull page jobs from a shared
//! queue. Each job is one page's fact list; the coordinator hands the
//! CPU-bound evaluation to the blocking thread pool and sends the page's
//! results back on the job's oneshot channel. Pages finish in any order.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::candidate::RenderingSource;
use crate::evaluate::{PreparedRendering, Verdict, evaluate_fact};
use crate::facts::Fact;
use crate::math::MathSession;
use crate::{Config, EvaluationResult, ProgressEvent};

// ── Public API ──────────────────────────────────────────────────────────

/// One page's facts, submitted to the pool.
pub struct PageJob {
    pub pdf: String,
    pub page: u32,
    pub facts: Vec<Fact>,
    pub result_tx: oneshot::Sender<Vec<EvaluationResult>>,
    pub page_index: usize,
    pub total: usize,
    /// Progress callback for this job.
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of coordinator tasks evaluating pages for one candidate.
///
/// Submit jobs via [`submit()`](EvaluationPool::submit), receive results via
/// the oneshot receiver returned with each job.
pub struct EvaluationPool {
    job_tx: async_channel::Sender<PageJob>,
    pool_handle: JoinHandle<()>,
}

impl EvaluationPool {
    /// Create a new pool with `num_workers` coordinator tasks.
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn RenderingSource>,
        math: Option<Arc<MathSession>>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<PageJob>();

        let pool_handle = tokio::spawn(async move {
            let mut coord_handles = Vec::with_capacity(num_workers.max(1));

            for _ in 0..num_workers.max(1) {
                coord_handles.push(tokio::spawn(coordinator_loop(
                    job_rx.clone(),
                    config.clone(),
                    source.clone(),
                    math.clone(),
                    cancel.clone(),
                )));
            }

            // Drop our clone so coordinators are the last holders
            drop(job_rx);

            // Coordinators exit when job_tx closes
            for h in coord_handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: PageJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the pool and wait for all coordinators to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

// ── Coordinator ─────────────────────────────────────────────────────────

async fn coordinator_loop(
    job_rx: async_channel::Receiver<PageJob>,
    config: Arc<Config>,
    source: Arc<dyn RenderingSource>,
    math: Option<Arc<MathSession>>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        let PageJob {
            pdf,
            page,
            facts,
            result_tx,
            page_index,
            total,
            progress,
        } = job;

        if cancel.is_cancelled() {
            tracing::debug!(pdf = %pdf, page, "skipping: cancelled");
            let results = facts
                .iter()
                .map(|f| EvaluationResult::failed(f, "run cancelled before evaluation"))
                .collect();
            let _ = result_tx.send(results);
            continue;
        }

        progress(ProgressEvent::PageStarted {
            index: page_index,
            total,
            pdf: pdf.clone(),
            page,
        });

        let task = {
            let source = source.clone();
            let math = math.clone();
            let threshold = config.pass_threshold;
            let pdf = pdf.clone();
            let facts = facts.clone();
            tokio::task::spawn_blocking(move || {
                evaluate_page(source.as_ref(), math.as_deref(), &pdf, page, &facts, threshold)
            })
        };

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(pdf = %pdf, page, error = %e, "page evaluation panicked");
                PageOutcome {
                    results: facts
                        .iter()
                        .map(|f| EvaluationResult::failed(f, format!("evaluation aborted: {e}")))
                        .collect(),
                    adapter_error: None,
                }
            }
        };

        if let Some(message) = outcome.adapter_error {
            progress(ProgressEvent::AdapterFailed {
                pdf: pdf.clone(),
                page,
                message,
            });
        }

        let passed = outcome.results.iter().filter(|r| r.passed).count();
        tracing::info!(
            page_index,
            pdf = %pdf,
            page,
            passed,
            failed = outcome.results.len() - passed,
            "page evaluated"
        );
        progress(ProgressEvent::PageFinished {
            index: page_index,
            total,
            pdf,
            page,
            passed,
            failed: outcome.results.len() - passed,
        });

        let _ = result_tx.send(outcome.results);
    }
}

// ── Page evaluation ─────────────────────────────────────────────────────

/// Results for one page, plus the adapter's complaint if it had no rendering.
pub struct PageOutcome {
    pub results: Vec<EvaluationResult>,
    pub adapter_error: Option<String>,
}

/// Evaluate every fact of one page against every repeat the candidate has.
///
/// Never fails: an adapter error fails each fact with the adapter's message.
pub fn evaluate_page(
    source: &dyn RenderingSource,
    math: Option<&MathSession>,
    pdf: &str,
    page: u32,
    facts: &[Fact],
    pass_threshold: f64,
) -> PageOutcome {
    let renderings = match source.renderings(pdf, page) {
        Ok(r) if !r.is_empty() => r,
        Ok(_) => {
            return adapter_failure(facts, format!("no rendering for {pdf} page {page}"));
        }
        Err(e) => {
            tracing::warn!(candidate = source.name(), pdf, page, error = %e, "adapter failed");
            return adapter_failure(facts, e.to_string());
        }
    };

    let prepared: Vec<PreparedRendering<'_>> =
        renderings.iter().map(|r| PreparedRendering::new(r)).collect();

    let results = facts
        .iter()
        .map(|fact| {
            let mut verdicts = Vec::with_capacity(prepared.len());
            for doc in &prepared {
                let verdict = evaluate_fact(fact, doc, math);
                let fixture = verdict.fixture_error;
                verdicts.push(verdict);
                // A broken fact is broken for every repeat.
                if fixture {
                    break;
                }
            }
            combine_repeats(fact, verdicts, pass_threshold)
        })
        .collect();

    PageOutcome {
        results,
        adapter_error: None,
    }
}

fn adapter_failure(facts: &[Fact], message: String) -> PageOutcome {
    PageOutcome {
        results: facts
            .iter()
            .map(|f| EvaluationResult::failed(f, format!("candidate error: {message}")))
            .collect(),
        adapter_error: Some(message),
    }
}

/// Fold per-repeat verdicts into one result. The score is the fraction of
/// repeats passed; the explanation is that of the first failing repeat.
pub fn combine_repeats(fact: &Fact, verdicts: Vec<Verdict>, pass_threshold: f64) -> EvaluationResult {
    let mut result = EvaluationResult::failed(fact, "");
    if verdicts.is_empty() {
        result.explanation = "no renderings".to_string();
        return result;
    }

    let n = verdicts.len();
    let passes = verdicts.iter().filter(|v| v.passed).count();
    let score = passes as f64 / n as f64;
    result.score = score;
    result.passed = score > pass_threshold;
    result.fixture_error = verdicts.iter().any(|v| v.fixture_error);

    let first_failure = verdicts.iter().find(|v| !v.passed);
    result.explanation = match (n, first_failure) {
        (1, _) => verdicts[0].explanation.clone(),
        (_, Some(f)) => format!("{passes}/{n} repeats passed; first failure: {}", f.explanation),
        (_, None) => format!("{n}/{n} repeats passed; {}", verdicts[0].explanation),
    };
    result
}
