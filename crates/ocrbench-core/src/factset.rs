//! Fact-set files: one JSON fact per line.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::CoreError;
use crate::facts::{Fact, FactError, FactType, RawFact, parse_fact};

/// A fact definition that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number in the source file.
    pub line: usize,
    pub error: FactError,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// The facts of one file, plus whatever was rejected.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    /// Short name used for per-source breakdowns (the file name).
    pub name: String,
    pub path: Option<PathBuf>,
    pub facts: Vec<Fact>,
    pub errors: Vec<LineError>,
}

impl FactSet {
    /// Parse JSONL content. Bad lines are collected, never fatal.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let name = name.into();
        let mut facts = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            match parse_fact(line) {
                Ok(fact) => {
                    if !seen.insert(fact.id.clone()) {
                        errors.push(LineError {
                            line: line_no,
                            error: FactError::DuplicateId { id: fact.id },
                        });
                        continue;
                    }
                    facts.push(fact);
                }
                Err(error) => {
                    tracing::warn!(source = %name, line = line_no, error = %error, "skipping malformed fact");
                    errors.push(LineError {
                        line: line_no,
                        error,
                    });
                }
            }
        }

        Self {
            name,
            path: None,
            facts,
            errors,
        }
    }

    pub fn count_by_type(&self, fact_type: FactType) -> usize {
        self.facts
            .iter()
            .filter(|f| f.fact_type() == fact_type)
            .count()
    }

    /// Distinct pdfs referenced by this set.
    pub fn pdfs(&self) -> BTreeSet<&str> {
        self.facts.iter().map(|f| f.pdf.as_str()).collect()
    }
}

/// Load a JSONL fact-set file.
pub fn load_fact_set(path: &Path) -> Result<FactSet, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut set = FactSet::parse(name, &content);
    set.path = Some(path.to_path_buf());
    tracing::debug!(
        path = %path.display(),
        facts = set.facts.len(),
        errors = set.errors.len(),
        "loaded fact set"
    );
    Ok(set)
}

/// Write facts as JSONL in the same schema they are loaded from.
pub fn save_facts(path: &Path, facts: &[Fact]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    let mut out = Vec::new();
    for fact in facts {
        serde_json::to_writer(&mut out, &RawFact::from(fact))?;
        out.push(b'\n');
    }
    let mut file = std::fs::File::create(path).map_err(|e| CoreError::io(path, e))?;
    file.write_all(&out).map_err(|e| CoreError::io(path, e))?;
    Ok(())
}

/// Add a default page-1 baseline fact for every pdf that has none.
///
/// Returns the number of facts added.
pub fn add_default_baselines(facts: &mut Vec<Fact>) -> usize {
    let covered: HashSet<String> = facts
        .iter()
        .filter(|f| f.fact_type() == FactType::Baseline)
        .map(|f| f.pdf.clone())
        .collect();
    let ids: HashSet<String> = facts.iter().map(|f| f.id.clone()).collect();

    let mut pdfs: Vec<String> = facts
        .iter()
        .map(|f| f.pdf.clone())
        .filter(|pdf| !covered.contains(pdf))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    pdfs.retain(|pdf| !ids.contains(&format!("{pdf}_baseline")));

    let added = pdfs.len();
    facts.extend(pdfs.iter().map(|pdf| Fact::baseline(pdf, 1)));
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"pdf":"a.pdf","page":1,"id":"a_1","type":"present","text":"hello"}

{"pdf":"a.pdf","page":1,"id":"a_2","type":"order","before":"one","after":"two"}
{"pdf":"a.pdf","page":1,"id":"a_1","type":"absent","text":"dup"}
{"pdf":"b.pdf","page":2,"id":"b_1","type":"math"}
not json at all
"#;

    #[test]
    fn test_parse_collects_errors_per_line() {
        let set = FactSet::parse("sample.jsonl", SAMPLE);
        assert_eq!(set.facts.len(), 2);
        assert_eq!(set.errors.len(), 3);
        assert_eq!(set.errors[0].line, 4);
        assert!(matches!(set.errors[0].error, FactError::DuplicateId { .. }));
        assert_eq!(set.errors[1].line, 5);
        assert!(matches!(
            set.errors[1].error,
            FactError::MissingField { field: "math", .. }
        ));
        assert_eq!(set.errors[2].line, 6);
        assert!(set.errors[2].to_string().starts_with("line 6: invalid JSON"));
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        std::fs::write(&path, SAMPLE).unwrap();

        let set = load_fact_set(&path).unwrap();
        assert_eq!(set.name, "facts.jsonl");
        assert_eq!(set.count_by_type(FactType::Present), 1);

        let out = dir.path().join("nested").join("out.jsonl");
        save_facts(&out, &set.facts).unwrap();
        let again = load_fact_set(&out).unwrap();
        assert!(again.errors.is_empty());
        assert_eq!(again.facts, set.facts);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_fact_set(Path::new("/definitely/not/here.jsonl")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn test_default_baselines_added_once_per_pdf() {
        let mut facts = FactSet::parse("s", SAMPLE).facts;
        facts.push(Fact::baseline("c.pdf", 3));
        facts.push(Fact::new(
            "c.pdf",
            3,
            "c_1",
            crate::facts::FactKind::Math(crate::facts::MathFact { math: "x".into() }),
        ));
        let added = add_default_baselines(&mut facts);
        assert_eq!(added, 1);
        let baselines: Vec<_> = facts
            .iter()
            .filter(|f| f.fact_type() == FactType::Baseline)
            .map(|f| (f.pdf.as_str(), f.page))
            .collect();
        assert_eq!(baselines, vec![("c.pdf", 3), ("a.pdf", 1)]);
        assert_eq!(add_default_baselines(&mut facts), 0);
    }
}
