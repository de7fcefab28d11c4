use std::fmt;
use std::str::FromStr;

use ocrbench_core::BenchmarkSummary;
use ocrbench_core::aggregate::Comparison;
use serde::{Deserialize, Serialize};

/// Output format for a benchmark summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
    Markdown,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Json, ExportFormat::Text, ExportFormat::Markdown];

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "text",
            ExportFormat::Markdown => "markdown",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.label() == s || f.extension() == s)
            .ok_or_else(|| format!("unknown export format `{s}` (expected json, text or markdown)"))
    }
}

/// Everything a run reports: one summary per candidate plus any pairwise
/// comparisons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub summaries: Vec<BenchmarkSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comparisons: Vec<Comparison>,
}

impl BenchmarkReport {
    /// Summaries ordered best score first; unscored candidates last.
    pub fn ranked(&self) -> Vec<&BenchmarkSummary> {
        let mut ranked: Vec<&BenchmarkSummary> = self.summaries.iter().collect();
        ranked.sort_by(|a, b| {
            let a = a.score.unwrap_or(f64::NEG_INFINITY);
            let b = b.score.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        ranked
    }
}
