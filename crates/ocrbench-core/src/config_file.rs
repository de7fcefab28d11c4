use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub concurrency: Option<ConcurrencyConfig>,
    pub statistics: Option<StatisticsConfig>,
    pub math: Option<MathConfig>,
    pub benchmark: Option<BenchmarkConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    pub bootstrap_samples: Option<usize>,
    pub confidence_level: Option<f64>,
    pub seed: Option<u64>,
    pub pass_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MathConfig {
    pub render_timeout_secs: Option<u64>,
    pub render_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Add a default baseline fact for pdfs that lack one.
    pub add_baselines: Option<bool>,
    /// Evaluate a seeded random subset of this many facts.
    pub sample: Option<usize>,
}

/// Platform config directory path: `<config_dir>/ocrbench/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ocrbench").join("config.toml"))
}

/// Load config by cascading CWD `.ocrbench.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".ocrbench.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

fn pick<S, T>(overlay: Option<&S>, base: Option<&S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay.and_then(&field).or_else(|| base.and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bc, oc) = (base.concurrency.as_ref(), overlay.concurrency.as_ref());
    let (bs, os) = (base.statistics.as_ref(), overlay.statistics.as_ref());
    let (bm, om) = (base.math.as_ref(), overlay.math.as_ref());
    let (bb, ob) = (base.benchmark.as_ref(), overlay.benchmark.as_ref());

    ConfigFile {
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(oc, bc, |c| c.num_workers),
        }),
        statistics: Some(StatisticsConfig {
            bootstrap_samples: pick(os, bs, |s| s.bootstrap_samples),
            confidence_level: pick(os, bs, |s| s.confidence_level),
            seed: pick(os, bs, |s| s.seed),
            pass_threshold: pick(os, bs, |s| s.pass_threshold),
        }),
        math: Some(MathConfig {
            render_timeout_secs: pick(om, bm, |m| m.render_timeout_secs),
            render_retries: pick(om, bm, |m| m.render_retries),
        }),
        benchmark: Some(BenchmarkConfig {
            add_baselines: pick(ob, bb, |b| b.add_baselines),
            sample: pick(ob, bb, |b| b.sample),
        }),
    }
}

impl ConfigFile {
    /// Write every value this file sets into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(c) = &self.concurrency
            && let Some(n) = c.num_workers
        {
            config.num_workers = n.max(1);
        }
        if let Some(s) = &self.statistics {
            if let Some(v) = s.bootstrap_samples {
                config.bootstrap_samples = v;
            }
            if let Some(v) = s.confidence_level {
                if v > 0.0 && v < 1.0 {
                    config.confidence_level = v;
                } else {
                    tracing::warn!(confidence_level = v, "ignoring out-of-range confidence level");
                }
            }
            if let Some(v) = s.seed {
                config.seed = v;
            }
            if let Some(v) = s.pass_threshold {
                config.pass_threshold = v.clamp(0.0, 1.0);
            }
        }
        if let Some(m) = &self.math {
            if let Some(v) = m.render_timeout_secs {
                config.render_timeout_secs = v;
            }
            if let Some(v) = m.render_retries {
                config.render_retries = v;
            }
        }
    }
}
