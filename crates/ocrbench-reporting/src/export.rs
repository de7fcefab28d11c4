use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use ocrbench_core::aggregate::RateStat;
use ocrbench_core::{BenchmarkSummary, EvaluationResult, FactType};
use serde::{Deserialize, Serialize};

use crate::ReportError;
use crate::types::{BenchmarkReport, ExportFormat};

/// Export a report to the given path.
pub fn export_report(
    report: &BenchmarkReport,
    format: ExportFormat,
    path: &Path,
) -> Result<(), ReportError> {
    let content = render_report(report, format)?;
    create_parent(path)?;
    std::fs::write(path, content).map_err(|e| ReportError::io(path, e))
}

/// Render a report in the given format.
pub fn render_report(report: &BenchmarkReport, format: ExportFormat) -> Result<String, ReportError> {
    Ok(match format {
        ExportFormat::Json => export_json(report)?,
        ExportFormat::Text => export_text(report),
        ExportFormat::Markdown => export_markdown(report),
    })
}

fn create_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    Ok(())
}

// ── Result streams ──────────────────────────────────────────────────────

/// One line of a result stream: the result, tagged with its candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLine {
    pub candidate: String,
    #[serde(flatten)]
    pub result: EvaluationResult,
}

/// Write one JSON object per result.
pub fn write_results_jsonl(
    w: &mut dyn Write,
    candidate: &str,
    results: &[EvaluationResult],
) -> Result<(), ReportError> {
    for result in results {
        let line = ResultLine {
            candidate: candidate.to_string(),
            result: result.clone(),
        };
        serde_json::to_writer(&mut *w, &line)?;
        w.write_all(b"\n").map_err(ReportError::Write)?;
    }
    Ok(())
}

/// Write a candidate's results to `path` as JSON lines.
pub fn export_results_jsonl(
    path: &Path,
    candidate: &str,
    results: &[EvaluationResult],
) -> Result<(), ReportError> {
    create_parent(path)?;
    let file = std::fs::File::create(path).map_err(|e| ReportError::io(path, e))?;
    let mut w = std::io::BufWriter::new(file);
    write_results_jsonl(&mut w, candidate, results)?;
    w.flush().map_err(|e| ReportError::io(path, e))
}

/// Read a result stream back, skipping blank lines.
pub fn read_results_jsonl(path: &Path) -> Result<Vec<ResultLine>, ReportError> {
    let file = std::fs::File::open(path).map_err(|e| ReportError::io(path, e))?;
    let mut lines = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ReportError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str(&line).map_err(|source| ReportError::Line {
            line: i + 1,
            source,
        })?;
        lines.push(parsed);
    }
    Ok(lines)
}

// ── Formatting helpers ──────────────────────────────────────────────────

fn pct(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "\u{2014}".to_string(),
    }
}

fn ci_str(summary: &BenchmarkSummary) -> String {
    match &summary.ci {
        Some(ci) => format!(
            "{:.0}% CI {} - {}",
            ci.level * 100.0,
            pct(Some(ci.lower)),
            pct(Some(ci.upper))
        ),
        None => "no CI".to_string(),
    }
}

fn count_str(stat: &RateStat) -> String {
    if stat.passed.fract() == 0.0 {
        format!("{:.0}/{}", stat.passed, stat.total)
    } else {
        format!("{:.2}/{}", stat.passed, stat.total)
    }
}

fn type_stat(summary: &BenchmarkSummary, fact_type: FactType) -> Option<&RateStat> {
    summary
        .by_type
        .iter()
        .find(|t| t.fact_type == fact_type)
        .map(|t| &t.stat)
}

/// Fact types scored for at least one candidate, in canonical order.
fn present_types(report: &BenchmarkReport) -> Vec<FactType> {
    FactType::ALL
        .into_iter()
        .filter(|t| report.summaries.iter().any(|s| type_stat(s, *t).is_some()))
        .collect()
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|")
}

// ── JSON ────────────────────────────────────────────────────────────────

fn export_json(report: &BenchmarkReport) -> Result<String, ReportError> {
    let mut out = serde_json::to_string_pretty(report)?;
    out.push('\n');
    Ok(out)
}

// ── Text ────────────────────────────────────────────────────────────────

fn export_text(report: &BenchmarkReport) -> String {
    let mut out = String::from("OCR Benchmark Results\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');

    for summary in report.ranked() {
        out.push_str(&format!("\n{}\n", summary.candidate));
        out.push_str(&"-".repeat(summary.candidate.chars().count()));
        out.push('\n');
        out.push_str(&format!(
            "  score {} ({}) | micro {} over {} facts",
            pct(summary.score),
            ci_str(summary),
            pct(summary.micro.rate),
            summary.micro.total,
        ));
        if summary.fixture_errors > 0 {
            out.push_str(&format!(" | {} fixture errors", summary.fixture_errors));
        }
        out.push_str("\n\n  By type:\n");
        for t in &summary.by_type {
            out.push_str(&format!(
                "    {:<10} {:>7}  ({})\n",
                t.fact_type.as_str(),
                pct(t.stat.rate),
                count_str(&t.stat)
            ));
        }
        out.push_str("\n  By source:\n");
        for s in &summary.by_source {
            out.push_str(&format!(
                "    {:<30} {:>7}  ({})",
                s.source,
                pct(s.stat.rate),
                count_str(&s.stat)
            ));
            if s.fixture_errors > 0 {
                out.push_str(&format!(" [{} fixture errors]", s.fixture_errors));
            }
            out.push('\n');
        }
    }

    if !report.comparisons.is_empty() {
        out.push_str("\nPairwise comparisons\n");
        out.push_str(&"-".repeat(20));
        out.push('\n');
        for c in &report.comparisons {
            out.push_str(&format!(
                "  {} vs {}: difference {:+.1} points over {} facts, p = {:.4}\n",
                c.first,
                c.second,
                c.mean_difference * 100.0,
                c.paired_facts,
                c.p_value
            ));
        }
    }
    out
}

// ── Markdown ────────────────────────────────────────────────────────────

fn export_markdown(report: &BenchmarkReport) -> String {
    let mut out = String::from("# OCR Benchmark Results\n\n");
    let ranked = report.ranked();
    let types = present_types(report);

    out.push_str("| Candidate | Score | Confidence interval | Micro | Facts | Fixture errors |\n");
    out.push_str("|-----------|-------|---------------------|-------|-------|----------------|\n");
    for s in &ranked {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            md_escape(&s.candidate),
            pct(s.score),
            ci_str(s),
            pct(s.micro.rate),
            s.total_facts,
            s.fixture_errors,
        ));
    }
    out.push('\n');

    if !types.is_empty() {
        out.push_str("## By fact type\n\n| Candidate |");
        for t in &types {
            out.push_str(&format!(" {} |", t.as_str()));
        }
        out.push_str("\n|-----------|");
        for _ in &types {
            out.push_str("---|");
        }
        out.push('\n');
        for s in &ranked {
            out.push_str(&format!("| {} |", md_escape(&s.candidate)));
            for t in &types {
                out.push_str(&format!(" {} |", pct(type_stat(s, *t).and_then(|st| st.rate))));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("## By source\n\n");
    for s in &ranked {
        out.push_str(&format!("### {}\n\n", s.candidate));
        out.push_str("| Source | Pass rate | Passed | Fixture errors |\n");
        out.push_str("|--------|-----------|--------|----------------|\n");
        for src in &s.by_source {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                md_escape(&src.source),
                pct(src.stat.rate),
                count_str(&src.stat),
                src.fixture_errors,
            ));
        }
        out.push('\n');
    }

    if !report.comparisons.is_empty() {
        out.push_str("## Pairwise comparisons\n\n");
        out.push_str("| First | Second | Difference | Paired facts | p-value |\n");
        out.push_str("|-------|--------|------------|--------------|---------|\n");
        for c in &report.comparisons {
            out.push_str(&format!(
                "| {} | {} | {:+.1} | {} | {:.4} |\n",
                md_escape(&c.first),
                md_escape(&c.second),
                c.mean_difference * 100.0,
                c.paired_facts,
                c.p_value,
            ));
        }
        out.push('\n');
    }
    out
}
