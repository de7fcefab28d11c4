use std::io::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use ocrbench_core::aggregate::Comparison;
use ocrbench_core::evaluate::Verdict;
use ocrbench_core::{BenchmarkSummary, EvaluationResult, Fact, FactSet, FactType, ProgressEvent};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn pct(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    let flat: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Per-candidate progress bar over pages.
#[derive(Clone)]
pub struct PageProgress {
    bar: ProgressBar,
    color: ColorMode,
}

impl PageProgress {
    pub fn new(candidate: &str, pages: usize, color: ColorMode) -> Self {
        let bar = ProgressBar::new(pages as u64);
        let template = if color.enabled() {
            "{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} pages (eta {eta})"
        } else {
            "{msg} [{bar:40}] {pos}/{len} pages (eta {eta})"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(candidate.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, color }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PageStarted { .. } => {}
            ProgressEvent::PageFinished { .. } => self.bar.inc(1),
            ProgressEvent::AdapterFailed { pdf, page, message } => {
                let line = format!("WARNING: {pdf} page {page}: {message}");
                if self.color.enabled() {
                    self.bar.println(line.yellow().to_string());
                } else {
                    self.bar.println(line);
                }
            }
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Print one candidate's scores.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &BenchmarkSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let ci = match &summary.ci {
        Some(ci) => format!(
            "{:.0}% CI {} - {}",
            ci.level * 100.0,
            pct(Some(ci.lower)),
            pct(Some(ci.upper))
        ),
        None => "no CI".to_string(),
    };
    if color.enabled() {
        writeln!(
            w,
            "{:20} : {} ({})",
            summary.candidate.bold(),
            pct(summary.score).bold().green(),
            ci.dimmed()
        )?;
    } else {
        writeln!(w, "{:20} : {} ({})", summary.candidate, pct(summary.score), ci)?;
    }
    writeln!(
        w,
        "    micro {} over {} facts",
        pct(summary.micro.rate),
        summary.micro.total
    )?;
    if summary.fixture_errors > 0 {
        let line = format!("    {} fixture errors excluded", summary.fixture_errors);
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{line}")?;
        }
    }

    for t in &summary.by_type {
        writeln!(
            w,
            "    {:9}: {} over {} facts",
            t.fact_type.as_str(),
            pct(t.stat.rate),
            t.stat.total
        )?;
    }

    writeln!(w, "\n    By source file:")?;
    for s in &summary.by_source {
        writeln!(
            w,
            "        {:30}: {} ({:.1}/{})",
            s.source,
            pct(s.stat.rate),
            s.stat.passed,
            s.stat.total
        )?;
    }
    Ok(())
}

/// Print the failures of one candidate, at most `limit` of them.
pub fn print_failures(
    w: &mut dyn Write,
    candidate: &str,
    results: &[EvaluationResult],
    limit: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    let failed: Vec<&EvaluationResult> = results.iter().filter(|r| !r.passed).collect();
    if failed.is_empty() || limit == 0 {
        return Ok(());
    }
    writeln!(w)?;
    let header = format!("{candidate}: {} failing facts", failed.len());
    if color.enabled() {
        writeln!(w, "{}", header.bold().red())?;
    } else {
        writeln!(w, "{header}")?;
    }
    for r in failed.iter().take(limit) {
        let tag = if r.fixture_error { "FIXTURE" } else { "FAIL" };
        let tag = if color.enabled() {
            tag.red().to_string()
        } else {
            tag.to_string()
        };
        writeln!(
            w,
            "  [{tag}] {} ({} p{} {}): {}",
            r.fact_id,
            r.pdf,
            r.page,
            r.fact_type,
            truncate(&r.explanation, 160)
        )?;
    }
    if failed.len() > limit {
        writeln!(w, "  ... and {} more", failed.len() - limit)?;
    }
    Ok(())
}

pub fn print_comparisons(
    w: &mut dyn Write,
    comparisons: &[Comparison],
    color: ColorMode,
) -> std::io::Result<()> {
    if comparisons.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Pairwise permutation tests".bold())?;
    } else {
        writeln!(w, "Pairwise permutation tests")?;
    }
    for c in comparisons {
        let p = format!("p = {:.4}", c.p_value);
        let p = if color.enabled() && c.p_value < 0.05 {
            p.green().to_string()
        } else {
            p
        };
        writeln!(
            w,
            "  {} vs {}: {:+.1} points over {} facts, {}",
            c.first,
            c.second,
            c.mean_difference * 100.0,
            c.paired_facts,
            p
        )?;
    }
    Ok(())
}

/// Print one fact's verdict from `ocrbench check`.
pub fn print_verdict(
    w: &mut dyn Write,
    fact: &Fact,
    verdict: &Verdict,
    color: ColorMode,
) -> std::io::Result<()> {
    let tag = match (verdict.passed, verdict.fixture_error) {
        (true, _) => "PASS",
        (false, true) => "FIXTURE",
        (false, false) => "FAIL",
    };
    let tag = if !color.enabled() {
        tag.to_string()
    } else if verdict.passed {
        tag.green().to_string()
    } else {
        tag.red().to_string()
    };
    writeln!(w, "[{tag}] {} {}", fact.id, truncate(&fact.describe(), 80))?;
    if color.enabled() {
        writeln!(w, "       {}", truncate(&verdict.explanation, 200).dimmed())?;
    } else {
        writeln!(w, "       {}", truncate(&verdict.explanation, 200))?;
    }
    Ok(())
}

/// Print the lint report for one fact-set file.
pub fn print_fact_set(w: &mut dyn Write, set: &FactSet, color: ColorMode) -> std::io::Result<()> {
    let counts: Vec<String> = FactType::ALL
        .iter()
        .map(|t| (t, set.count_by_type(*t)))
        .filter(|(_, n)| *n > 0)
        .map(|(t, n)| format!("{n} {t}"))
        .collect();
    let status = if set.errors.is_empty() { "OK" } else { "ERRORS" };
    let status = match (color.enabled(), set.errors.is_empty()) {
        (false, _) => status.to_string(),
        (true, true) => status.green().to_string(),
        (true, false) => status.red().to_string(),
    };
    writeln!(
        w,
        "{} [{status}] {} facts over {} pdfs ({})",
        set.name,
        set.facts.len(),
        set.pdfs().len(),
        if counts.is_empty() {
            "empty".to_string()
        } else {
            counts.join(", ")
        }
    )?;
    for e in &set.errors {
        writeln!(w, "    {e}")?;
    }
    Ok(())
}
