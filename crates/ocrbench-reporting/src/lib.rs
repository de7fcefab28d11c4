//! Serialization of benchmark output: per-fact result streams (JSON lines)
//! and candidate summaries (JSON, plain text, Markdown).

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod export;
pub mod types;

pub use export::{
    ResultLine, export_report, export_results_jsonl, read_results_jsonl, render_report,
    write_results_jsonl,
};
pub use types::{BenchmarkReport, ExportFormat};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl ReportError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
