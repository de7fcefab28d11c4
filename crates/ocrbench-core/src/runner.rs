use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::candidate::RenderingSource;
use crate::facts::{Fact, FactType};
use crate::math::MathSession;
use crate::pool::{EvaluationPool, PageJob};
use crate::{Config, CoreError, EvaluationResult, ProgressEvent};

/// Evaluate `facts` against one candidate.
///
/// Facts are grouped by page so each rendering is read and prepared once.
/// Pages go to an internal [`EvaluationPool`]; results are put back in the
/// order of `facts`. Pages never submitted because of cancellation fail with
/// a "cancelled" explanation, so the output always has one result per fact.
pub async fn evaluate_candidate(
    facts: &[Fact],
    source: Arc<dyn RenderingSource>,
    math: Option<Arc<MathSession>>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Vec<EvaluationResult>, CoreError> {
    if facts.is_empty() {
        return Ok(vec![]);
    }

    if let Some(session) = &math
        && facts.iter().any(|f| f.fact_type() == FactType::Math)
    {
        tracing::debug!(renderer = session.renderer_name(), "starting math renderer");
        let session = session.clone();
        tokio::task::spawn_blocking(move || session.ensure_started())
            .await
            .map_err(|e| CoreError::InvalidInput(format!("renderer start aborted: {e}")))??;
    }

    // (pdf, page) -> positions in `facts`, in first-seen order
    let mut page_order: Vec<(String, u32)> = Vec::new();
    let mut by_page: HashMap<(String, u32), Vec<usize>> = HashMap::new();
    for (i, fact) in facts.iter().enumerate() {
        let key = (fact.pdf.clone(), fact.page);
        by_page
            .entry(key.clone())
            .or_insert_with(|| {
                page_order.push(key);
                Vec::new()
            })
            .push(i);
    }

    let total = page_order.len();
    let num_workers = config.num_workers.max(1);
    let config = Arc::new(config);
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);

    tracing::info!(
        candidate = source.name(),
        facts = facts.len(),
        pages = total,
        workers = num_workers,
        "evaluating candidate"
    );

    let pool = EvaluationPool::new(config, source, math, cancel.clone(), num_workers);

    let mut receivers = Vec::with_capacity(total);
    for (page_index, key) in page_order.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let positions = &by_page[key];
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let job = PageJob {
            pdf: key.0.clone(),
            page: key.1,
            facts: positions.iter().map(|&i| facts[i].clone()).collect(),
            result_tx,
            page_index,
            total,
            progress: progress.clone(),
        };
        pool.submit(job).await;
        receivers.push((positions, result_rx));
    }

    let mut results: Vec<Option<EvaluationResult>> = vec![None; facts.len()];
    for (positions, rx) in receivers {
        if let Ok(page_results) = rx.await {
            for (&i, result) in positions.iter().zip(page_results) {
                results[i] = Some(result);
            }
        }
    }

    pool.shutdown().await;

    Ok(results
        .into_iter()
        .zip(facts)
        .map(|(r, fact)| {
            r.unwrap_or_else(|| EvaluationResult::failed(fact, "run cancelled before evaluation"))
        })
        .collect())
}
