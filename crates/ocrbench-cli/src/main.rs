use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ocrbench_core::aggregate::{
    Comparison, SummaryOptions, compare_candidates, facts_failed_by_all, sample_facts, summarize,
};
use ocrbench_core::evaluate::{PreparedRendering, evaluate_fact};
use ocrbench_core::factset::add_default_baselines;
use ocrbench_core::{
    Config, DirectoryCandidate, EvaluationResult, Fact, FactSet, FactType, MathSession,
    RenderingSource, load_fact_set, save_facts,
};
use ocrbench_katex::KatexRenderer;
use ocrbench_reporting::{BenchmarkReport, ExportFormat};
use tokio_util::sync::CancellationToken;

mod output;

use output::{ColorMode, PageProgress};

/// Source label for baseline facts added automatically.
const BASELINE_SOURCE: &str = "baseline";

/// OCR benchmark - score OCR output against machine-checkable facts about PDF pages
#[derive(Parser, Debug)]
#[command(name = "ocrbench", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark every candidate in a data directory
    Run {
        /// Directory holding *.jsonl fact sets and one subdirectory per candidate
        data_dir: PathBuf,

        /// Only evaluate these candidates (repeatable)
        #[arg(long = "candidate")]
        candidates: Vec<String>,

        /// Do not add default baseline facts
        #[arg(long)]
        skip_baseline: bool,

        /// Evaluate a seeded random sample of N facts
        #[arg(long)]
        sample: Option<usize>,

        /// Number of concurrent page workers
        #[arg(long)]
        workers: Option<usize>,

        /// Bootstrap resamples for the confidence interval
        #[arg(long)]
        bootstrap_samples: Option<usize>,

        /// Confidence level of the interval, e.g. 0.95
        #[arg(long)]
        confidence_level: Option<f64>,

        /// Seed for sampling, bootstrap and permutation tests
        #[arg(long)]
        seed: Option<u64>,

        /// Math render timeout in seconds
        #[arg(long)]
        render_timeout: Option<u64>,

        /// Skip the math engine; math facts fail
        #[arg(long)]
        no_math: bool,

        /// Compare two candidates with a permutation test, as `a:b` (repeatable)
        #[arg(long = "compare", value_parser = parse_pair)]
        compare: Vec<(String, String)>,

        /// Permutation test iterations
        #[arg(long, default_value_t = 10_000)]
        permutations: usize,

        /// Write the summary to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Summary format for --output (json, text, markdown)
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Write per-fact results as <candidate>.jsonl into this directory
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Write facts that failed for every candidate to this JSONL file
        #[arg(long)]
        output_failed: Option<PathBuf>,

        /// Print up to N failing facts per candidate
        #[arg(long, default_value_t = 0)]
        show_failures: usize,
    },

    /// Evaluate a fact file against a single rendering
    Check {
        /// JSONL fact set
        facts: PathBuf,

        /// Markdown or text rendering of the page
        rendering: PathBuf,

        /// Only check facts about this page
        #[arg(long)]
        page: Option<u32>,

        /// Skip the math engine; math facts fail
        #[arg(long)]
        no_math: bool,
    },

    /// Lint fact-set files
    Validate {
        /// JSONL fact sets
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((a, b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err(format!("expected `first:second`, got `{s}`")),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Run {
            data_dir,
            candidates,
            skip_baseline,
            sample,
            workers,
            bootstrap_samples,
            confidence_level,
            seed,
            render_timeout,
            no_math,
            compare,
            permutations,
            output,
            format,
            results_dir,
            output_failed,
            show_failures,
        } => {
            // Resolve configuration: CLI flags > env vars > config file > defaults
            let file = ocrbench_core::config_file::load_config();
            let mut config = Config::default();
            file.apply(&mut config);
            apply_env(&mut config);
            if let Some(n) = workers {
                config.num_workers = n.max(1);
            }
            if let Some(n) = bootstrap_samples {
                config.bootstrap_samples = n;
            }
            if let Some(level) = confidence_level {
                anyhow::ensure!(
                    level > 0.0 && level < 1.0,
                    "--confidence-level must be between 0 and 1"
                );
                config.confidence_level = level;
            }
            if let Some(s) = seed {
                config.seed = s;
            }
            if let Some(t) = render_timeout {
                config.render_timeout_secs = t;
            }
            let bench = file.benchmark.clone().unwrap_or_default();
            let options = RunOptions {
                candidates,
                add_baselines: !skip_baseline && bench.add_baselines.unwrap_or(true),
                sample: sample.or(bench.sample),
                no_math,
                compare,
                permutations,
                output,
                format,
                results_dir,
                output_failed,
                show_failures,
            };
            run(&data_dir, config, options, color).await
        }
        Command::Check {
            facts,
            rendering,
            page,
            no_math,
        } => {
            let mut config = Config::default();
            ocrbench_core::config_file::load_config().apply(&mut config);
            apply_env(&mut config);
            check(&facts, &rendering, page, no_math, &config, color).await
        }
        Command::Validate { files } => validate(&files, color),
    }
}

fn apply_env(config: &mut Config) {
    if let Some(n) = std::env::var("OCRBENCH_WORKERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        config.num_workers = n.max(1);
    }
    if let Some(t) = std::env::var("OCRBENCH_RENDER_TIMEOUT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        config.render_timeout_secs = t;
    }
}

fn math_session(config: &Config, disabled: bool) -> Option<Arc<MathSession>> {
    if disabled {
        return None;
    }
    let renderer = KatexRenderer::new(Duration::from_secs(config.render_timeout_secs.max(1)));
    Some(Arc::new(MathSession::new(
        Arc::new(renderer),
        config.render_retries,
    )))
}

struct RunOptions {
    candidates: Vec<String>,
    add_baselines: bool,
    sample: Option<usize>,
    no_math: bool,
    compare: Vec<(String, String)>,
    permutations: usize,
    output: Option<PathBuf>,
    format: ExportFormat,
    results_dir: Option<PathBuf>,
    output_failed: Option<PathBuf>,
    show_failures: usize,
}

/// Fact sets in `data_dir`, sorted by file name.
fn load_fact_sets(data_dir: &Path) -> anyhow::Result<Vec<FactSet>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .with_context(|| format!("cannot read data directory {}", data_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("jsonl")))
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|p| load_fact_set(p).map_err(anyhow::Error::from))
        .collect()
}

/// Candidate directories: every subdirectory except `pdfs`.
fn candidate_dirs(data_dir: &Path, only: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .with_context(|| format!("cannot read data directory {}", data_dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned());
            match name.as_deref() {
                None | Some("pdfs") => false,
                Some(n) => only.is_empty() || only.iter().any(|o| o == n),
            }
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Merge fact sets, rejecting ids that appear in more than one file.
/// Returns the facts and a fact id -> source file map.
fn merge_fact_sets(sets: &[FactSet]) -> anyhow::Result<(Vec<Fact>, HashMap<String, String>)> {
    let mut facts = Vec::new();
    let mut sources: HashMap<String, String> = HashMap::new();
    for set in sets {
        for fact in &set.facts {
            if let Some(previous) = sources.insert(fact.id.clone(), set.name.clone()) {
                anyhow::bail!(
                    "fact id `{}` appears in both {} and {}",
                    fact.id,
                    previous,
                    set.name
                );
            }
            facts.push(fact.clone());
        }
    }
    Ok((facts, sources))
}

async fn run(
    data_dir: &Path,
    config: Config,
    options: RunOptions,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let writer: &mut dyn Write = &mut stdout;

    let sets = load_fact_sets(data_dir)?;
    if sets.is_empty() {
        anyhow::bail!("no .jsonl fact sets found in {}", data_dir.display());
    }
    for set in sets.iter().filter(|s| !s.errors.is_empty()) {
        output::print_fact_set(writer, set, color)?;
    }
    let (mut facts, mut sources) = merge_fact_sets(&sets)?;
    if facts.is_empty() {
        anyhow::bail!("no valid facts found in {}", data_dir.display());
    }

    if options.add_baselines {
        let before = facts.len();
        let added = add_default_baselines(&mut facts);
        for fact in &facts[before..] {
            sources.insert(fact.id.clone(), BASELINE_SOURCE.to_string());
        }
        tracing::info!(added, "added default baseline facts");
    }

    if let Some(n) = options.sample.filter(|n| *n > 0) {
        if n < facts.len() {
            writeln!(writer, "Randomly sampling {} of {} facts", n, facts.len())?;
        }
        facts = sample_facts(&facts, n, config.seed);
    }

    let dirs = candidate_dirs(data_dir, &options.candidates)?;
    if dirs.is_empty() {
        anyhow::bail!(
            "no candidate directories found in {} (subdirectories besides `pdfs`)",
            data_dir.display()
        );
    }

    let needs_math = facts.iter().any(|f| f.fact_type() == FactType::Math);
    let math = math_session(&config, options.no_math || !needs_math);
    let pages: BTreeSet<(&str, u32)> = facts.iter().map(|f| (f.pdf.as_str(), f.page)).collect();

    writeln!(
        writer,
        "Evaluating {} facts on {} pages from {} fact sets against {} candidates",
        facts.len(),
        pages.len(),
        sets.len(),
        dirs.len()
    )?;

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let summary_options = SummaryOptions::from(&config);
    let mut report = BenchmarkReport::default();
    let mut all_results: Vec<(String, Vec<EvaluationResult>)> = Vec::new();

    for dir in &dirs {
        if cancel.is_cancelled() {
            break;
        }
        let candidate = DirectoryCandidate::open(dir)?;
        let name = candidate.name().to_string();
        tracing::info!(
            candidate = %name,
            root = %candidate.root().display(),
            pages = candidate.page_count(),
            "opened candidate"
        );
        let progress = PageProgress::new(&name, pages.len(), color);
        let progress_cb = {
            let progress = progress.clone();
            move |event: ocrbench_core::ProgressEvent| progress.handle(&event)
        };

        let results = ocrbench_core::evaluate_candidate(
            &facts,
            Arc::new(candidate),
            math.clone(),
            config.clone(),
            progress_cb,
            cancel.clone(),
        )
        .await?;
        progress.finish();

        let summary = summarize(&name, &results, &sources, summary_options);
        output::print_summary(writer, &summary, color)?;
        output::print_failures(writer, &name, &results, options.show_failures, color)?;

        if let Some(dir) = &options.results_dir {
            let path = dir.join(format!("{name}.jsonl"));
            ocrbench_reporting::export_results_jsonl(&path, &name, &results)?;
        }
        report.summaries.push(summary);
        all_results.push((name, results));
    }

    if cancel.is_cancelled() {
        writeln!(writer, "\nRun cancelled; results above are partial.")?;
    }

    report.comparisons = comparisons(&all_results, &options.compare, options.permutations, config.seed);
    output::print_comparisons(writer, &report.comparisons, color)?;

    if let Some(path) = &options.output {
        let path = if path.extension().is_none() {
            path.with_extension(options.format.extension())
        } else {
            path.clone()
        };
        ocrbench_reporting::export_report(&report, options.format, &path)?;
        writeln!(writer, "\nWrote {} summary to {}", options.format, path.display())?;
    }

    if let Some(path) = &options.output_failed {
        let per_candidate: Vec<&[EvaluationResult]> =
            all_results.iter().map(|(_, r)| r.as_slice()).collect();
        let failed = facts_failed_by_all(&facts, &per_candidate);
        if failed.is_empty() {
            writeln!(writer, "\nNo facts failed for every candidate; nothing written.")?;
        } else {
            save_facts(path, &failed)?;
            writeln!(
                writer,
                "\nWrote {} facts that failed for every candidate to {}",
                failed.len(),
                path.display()
            )?;
        }
    }

    Ok(())
}

fn comparisons(
    all_results: &[(String, Vec<EvaluationResult>)],
    pairs: &[(String, String)],
    iterations: usize,
    seed: u64,
) -> Vec<Comparison> {
    let find = |name: &str| all_results.iter().find(|(n, _)| n == name);
    pairs
        .iter()
        .filter_map(|(a, b)| {
            let (Some((a, ra)), Some((b, rb))) = (find(a), find(b)) else {
                tracing::warn!(first = %a, second = %b, "comparison skipped: candidate not evaluated");
                return None;
            };
            compare_candidates((a.as_str(), ra.as_slice()), (b.as_str(), rb.as_slice()), iterations, seed)
        })
        .collect()
}

async fn check(
    facts_path: &Path,
    rendering_path: &Path,
    page: Option<u32>,
    no_math: bool,
    config: &Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    let mut writer = std::io::stdout();

    let set = load_fact_set(facts_path)?;
    output::print_fact_set(&mut writer, &set, color)?;
    let rendering = std::fs::read_to_string(rendering_path)
        .with_context(|| format!("cannot read {}", rendering_path.display()))?;

    let facts: Vec<Fact> = set
        .facts
        .into_iter()
        .filter(|f| page.is_none_or(|p| f.page == p))
        .collect();
    let needs_math = facts.iter().any(|f| f.fact_type() == FactType::Math);
    let math = math_session(config, no_math || !needs_math);

    // The engine and evaluation are blocking; keep them off the runtime.
    let verdicts = tokio::task::spawn_blocking(move || {
        if let Some(session) = &math {
            session.ensure_started()?;
        }
        let doc = PreparedRendering::new(&rendering);
        let verdicts: Vec<_> = facts
            .iter()
            .map(|f| evaluate_fact(f, &doc, math.as_deref()))
            .collect();
        Ok::<_, ocrbench_core::RenderError>((facts, verdicts))
    })
    .await?;
    let (facts, verdicts) = verdicts?;

    writeln!(writer)?;
    for (fact, verdict) in facts.iter().zip(&verdicts) {
        output::print_verdict(&mut writer, fact, verdict, color)?;
    }

    let passed = verdicts.iter().filter(|v| v.passed).count();
    let fixture = verdicts.iter().filter(|v| v.fixture_error).count();
    writeln!(
        writer,
        "\n{passed}/{} passed{}",
        verdicts.len(),
        if fixture > 0 {
            format!(", {fixture} fixture errors")
        } else {
            String::new()
        }
    )?;
    Ok(())
}

fn validate(files: &[PathBuf], color: ColorMode) -> anyhow::Result<()> {
    let mut writer = std::io::stdout();
    let mut sets = Vec::with_capacity(files.len());
    for path in files {
        let set = load_fact_set(path)?;
        output::print_fact_set(&mut writer, &set, color)?;
        sets.push(set);
    }

    let errors: usize = sets.iter().map(|s| s.errors.len()).sum();
    let merged = merge_fact_sets(&sets);
    if let Err(e) = &merged {
        writeln!(writer, "{e}")?;
    }
    if errors > 0 || merged.is_err() {
        anyhow::bail!("{errors} invalid fact definitions");
    }
    writeln!(writer, "All fact sets valid.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_accepts_colon_pairs() {
        assert_eq!(
            parse_pair("marker:olmocr"),
            Ok(("marker".to_string(), "olmocr".to_string()))
        );
        assert!(parse_pair("marker").is_err());
        assert!(parse_pair(":x").is_err());
    }

    #[test]
    fn candidate_dirs_skip_pdfs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        for d in ["pdfs", "marker", "olmocr"] {
            std::fs::create_dir(dir.path().join(d)).unwrap();
        }
        std::fs::write(dir.path().join("facts.jsonl"), "").unwrap();

        let all = candidate_dirs(dir.path(), &[]).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["marker", "olmocr"]);

        let only = candidate_dirs(dir.path(), &["olmocr".to_string()]).unwrap();
        assert_eq!(only.len(), 1);
    }

    #[test]
    fn merge_rejects_cross_file_duplicates() {
        let line = r#"{"pdf":"a.pdf","page":1,"id":"dup","type":"present","text":"x"}"#;
        let a = FactSet::parse("a.jsonl", line);
        let b = FactSet::parse("b.jsonl", line);
        assert!(merge_fact_sets(std::slice::from_ref(&a)).is_ok());
        let err = merge_fact_sets(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("dup"));
    }
}
