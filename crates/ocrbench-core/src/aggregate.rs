//! Turning a stream of evaluation results into benchmark scores.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::facts::{Fact, FactType};
use crate::stats::{self, ConfidenceInterval};
use crate::{Config, EvaluationResult};

/// Source label for results whose fact id is not in the source map.
pub const UNLABELLED_SOURCE: &str = "(unlabelled)";

/// Passed score over scored facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateStat {
    /// Facts passed; in the per-type breakdown, the sum of repeat fractions.
    pub passed: f64,
    pub total: usize,
    /// `None` when no fact was scored.
    pub rate: Option<f64>,
}

impl RateStat {
    fn add(&mut self, score: f64) {
        self.passed += score;
        self.total += 1;
        self.rate = Some(self.passed / self.total as f64);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub fact_type: FactType,
    #[serde(flatten)]
    pub stat: RateStat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: String,
    #[serde(flatten)]
    pub stat: RateStat,
    pub fixture_errors: usize,
}

/// Aggregated scores of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub candidate: String,
    /// Mean of the per-source pass rates.
    pub score: Option<f64>,
    /// Pass rate over all scored facts, ignoring sources.
    pub micro: RateStat,
    pub ci: Option<ConfidenceInterval>,
    pub by_type: Vec<TypeSummary>,
    pub by_source: Vec<SourceSummary>,
    /// Results excluded from every rate because the fact itself is broken.
    pub fixture_errors: usize,
    pub total_facts: usize,
}

/// Bootstrap settings for [`summarize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryOptions {
    pub bootstrap_samples: usize,
    pub confidence_level: f64,
    pub seed: u64,
}

impl From<&Config> for SummaryOptions {
    fn from(config: &Config) -> Self {
        Self {
            bootstrap_samples: config.bootstrap_samples,
            confidence_level: config.confidence_level,
            seed: config.seed,
        }
    }
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Summarize one candidate's results.
///
/// `sources` maps fact ids to the fact-set file they came from.
pub fn summarize(
    candidate: &str,
    results: &[EvaluationResult],
    sources: &HashMap<String, String>,
    options: SummaryOptions,
) -> BenchmarkSummary {
    let mut micro = RateStat::default();
    let mut by_type: BTreeMap<FactType, RateStat> = BTreeMap::new();
    let mut by_source: BTreeMap<&str, (RateStat, usize, Vec<f64>)> = BTreeMap::new();
    let mut fixture_errors = 0;

    for r in results {
        let source = sources
            .get(&r.fact_id)
            .map(String::as_str)
            .unwrap_or(UNLABELLED_SOURCE);
        let entry = by_source.entry(source).or_default();
        if r.fixture_error {
            fixture_errors += 1;
            entry.1 += 1;
            continue;
        }
        // Pass rates count verdicts; only the per-type breakdown averages
        // the fraction of repeats passed.
        let passed = r.passed as u8 as f64;
        micro.add(passed);
        by_type.entry(r.fact_type).or_default().add(r.score);
        entry.0.add(passed);
        entry.2.push(passed);
    }

    let groups: Vec<Vec<f64>> = by_source.values().map(|(_, _, s)| s.clone()).collect();
    let score = stats::mean_of_means(&groups);
    let ci = stats::bootstrap_ci(
        &groups,
        options.bootstrap_samples,
        options.confidence_level,
        options.seed,
    );

    BenchmarkSummary {
        candidate: candidate.to_string(),
        score,
        micro,
        ci,
        by_type: by_type
            .into_iter()
            .map(|(fact_type, stat)| TypeSummary { fact_type, stat })
            .collect(),
        by_source: by_source
            .into_iter()
            .map(|(source, (stat, fixture_errors, _))| SourceSummary {
                source: source.to_string(),
                stat,
                fixture_errors,
            })
            .collect(),
        fixture_errors,
        total_facts: results.len(),
    }
}

/// Outcome of a paired permutation test between two candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub first: String,
    pub second: String,
    /// Facts scored for both candidates.
    pub paired_facts: usize,
    /// Mean score of `first` minus that of `second` on the paired facts.
    pub mean_difference: f64,
    pub p_value: f64,
}

/// Compare two candidates on the facts both of them scored.
pub fn compare_candidates(
    first: (&str, &[EvaluationResult]),
    second: (&str, &[EvaluationResult]),
    iterations: usize,
    seed: u64,
) -> Option<Comparison> {
    let second_scores: HashMap<&str, f64> = second
        .1
        .iter()
        .filter(|r| !r.fixture_error)
        .map(|r| (r.fact_id.as_str(), r.score))
        .collect();
    let (a, b): (Vec<f64>, Vec<f64>) = first
        .1
        .iter()
        .filter(|r| !r.fixture_error)
        .filter_map(|r| second_scores.get(r.fact_id.as_str()).map(|s| (r.score, *s)))
        .unzip();

    let p_value = stats::permutation_test(&a, &b, iterations, seed)?;
    let mean_difference = stats::mean(&a)? - stats::mean(&b)?;
    Some(Comparison {
        first: first.0.to_string(),
        second: second.0.to_string(),
        paired_facts: a.len(),
        mean_difference,
        p_value,
    })
}

/// Seeded random subset of `count` facts, kept in their original order.
pub fn sample_facts(facts: &[Fact], count: usize, seed: u64) -> Vec<Fact> {
    if count >= facts.len() {
        return facts.to_vec();
    }
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut indices: Vec<usize> = (0..facts.len()).collect();
    rng.shuffle(&mut indices);
    indices.truncate(count);
    indices.sort_unstable();
    indices.into_iter().map(|i| facts[i].clone()).collect()
}

/// Facts that no candidate passed. Fixture errors are never included, and
/// a fact missing from some candidate's results does not count as failed.
pub fn facts_failed_by_all(facts: &[Fact], candidates: &[&[EvaluationResult]]) -> Vec<Fact> {
    if candidates.is_empty() {
        return vec![];
    }
    let failed: Vec<HashSet<&str>> = candidates
        .iter()
        .map(|results| {
            results
                .iter()
                .filter(|r| !r.passed && !r.fixture_error)
                .map(|r| r.fact_id.as_str())
                .collect()
        })
        .collect();
    facts
        .iter()
        .filter(|f| failed.iter().all(|set| set.contains(f.id.as_str())))
        .cloned()
        .collect()
}
