//! Candidate OCR outputs: where renderings come from.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::CoreError;

/// `<pdf stem>_pg<page>_repeat<n>.md`
static RENDERING_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_pg(\d+)_repeat(\d+)\.md$").unwrap());

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("no rendering for {pdf} page {page}")]
    Missing { pdf: String, page: u32 },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// A candidate OCR tool's output, one or more renderings per page.
pub trait RenderingSource: Send + Sync {
    /// Name shown in reports.
    fn name(&self) -> &str;

    /// Every rendering (repeat) of `page` of `pdf`, in repeat order.
    fn renderings(&self, pdf: &str, page: u32) -> Result<Vec<String>, AdapterError>;
}

/// File stem of a pdf identifier (`dir/doc.pdf` -> `doc`).
pub fn pdf_stem(pdf: &str) -> String {
    Path::new(pdf)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.to_string())
}

/// `/`-joined `dir` components followed by `stem`, ignoring `.` and roots.
fn join_key(dir: Option<&Path>, stem: &str) -> String {
    let mut parts: Vec<String> = dir
        .into_iter()
        .flat_map(|d| d.components())
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.push(stem.to_string());
    parts.join("/")
}

/// Relative pdf path without its extension (`./a/doc.pdf` -> `a/doc`).
pub fn pdf_key(pdf: &str) -> String {
    join_key(Path::new(pdf).parent(), &pdf_stem(pdf))
}

/// Renderings stored as Markdown files anywhere under one directory.
///
/// A file `a/doc_pg1_repeat1.md` belongs to pdf `a/doc.pdf`. A pdf whose
/// relative path has no renderings falls back to files with the same stem
/// in another folder, provided only one folder has them.
#[derive(Debug, Clone)]
pub struct DirectoryCandidate {
    name: String,
    root: PathBuf,
    /// (pdf key, page) -> (repeat, path), sorted by repeat.
    index: HashMap<(String, u32), Vec<(u32, PathBuf)>>,
    /// (pdf stem, page) -> pdf keys having renderings.
    by_stem: HashMap<(String, u32), BTreeSet<String>>,
}

impl DirectoryCandidate {
    /// Index every rendering file below `root`. The candidate is named after
    /// the directory.
    pub fn open(root: &Path) -> Result<Self, CoreError> {
        let mut index: HashMap<(String, u32), Vec<(u32, PathBuf)>> = HashMap::new();
        let mut by_stem: HashMap<(String, u32), BTreeSet<String>> = HashMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| CoreError::io(&dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| CoreError::io(&dir, e))?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(caps) = RENDERING_FILE_RE.captures(file_name) else {
                    continue;
                };
                let (Ok(page), Ok(repeat)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
                    continue;
                };
                let dir = path.parent().and_then(|p| p.strip_prefix(root).ok());
                let key = join_key(dir, &caps[1]);
                by_stem
                    .entry((caps[1].to_string(), page))
                    .or_default()
                    .insert(key.clone());
                index.entry((key, page)).or_default().push((repeat, path));
            }
        }
        for files in index.values_mut() {
            files.sort();
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        tracing::debug!(candidate = %name, pages = index.len(), "indexed candidate directory");
        Ok(Self {
            name,
            root: root.to_path_buf(),
            index,
            by_stem,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of (pdf, page) pairs with at least one rendering.
    pub fn page_count(&self) -> usize {
        self.index.len()
    }

    fn files(&self, pdf: &str, page: u32) -> Result<&[(u32, PathBuf)], AdapterError> {
        if let Some(files) = self.index.get(&(pdf_key(pdf), page)) {
            return Ok(files.as_slice());
        }
        let missing = || AdapterError::Missing {
            pdf: pdf.to_string(),
            page,
        };
        let keys = self.by_stem.get(&(pdf_stem(pdf), page)).ok_or_else(missing)?;
        match keys.iter().next() {
            Some(key) if keys.len() == 1 => self
                .index
                .get(&(key.clone(), page))
                .map(Vec::as_slice)
                .ok_or_else(missing),
            _ => Err(AdapterError::Other(format!(
                "renderings for {pdf} page {page} are ambiguous: {}",
                keys.iter().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

impl RenderingSource for DirectoryCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn renderings(&self, pdf: &str, page: u32) -> Result<Vec<String>, AdapterError> {
        self.files(pdf, page)?
            .iter()
            .map(|(_, path)| {
                std::fs::read_to_string(path).map_err(|source| AdapterError::Io {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// Renderings held in memory, keyed by pdf path (without extension) and page.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCandidate {
    name: String,
    pages: HashMap<(String, u32), Vec<String>>,
}

impl InMemoryCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pages: HashMap::new(),
        }
    }

    /// Add one more repeat for a page.
    pub fn insert(&mut self, pdf: &str, page: u32, text: impl Into<String>) {
        self.pages
            .entry((pdf_key(pdf), page))
            .or_default()
            .push(text.into());
    }

    pub fn with(mut self, pdf: &str, page: u32, text: impl Into<String>) -> Self {
        self.insert(pdf, page, text);
        self
    }
}

impl RenderingSource for InMemoryCandidate {
    fn name(&self) -> &str {
        &self.name
    }

    fn renderings(&self, pdf: &str, page: u32) -> Result<Vec<String>, AdapterError> {
        match self.pages.get(&(pdf_key(pdf), page)) {
            Some(texts) if !texts.is_empty() => Ok(texts.clone()),
            _ => Err(AdapterError::Missing {
                pdf: pdf.to_string(),
                page,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_candidate_indexes_nested_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("marker");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("doc_pg1_repeat2.md"), "second").unwrap();
        std::fs::write(root.join("sub").join("doc_pg1_repeat1.md"), "first").unwrap();
        std::fs::write(root.join("doc_pg2_repeat1.md"), "page two").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();

        let cand = DirectoryCandidate::open(&root).unwrap();
        assert_eq!(cand.name(), "marker");
        assert_eq!(cand.page_count(), 2);
        assert_eq!(cand.renderings("sub/doc.pdf", 1).unwrap(), vec!["first", "second"]);
        // Unique stems resolve from any folder.
        assert_eq!(cand.renderings("doc.pdf", 1).unwrap(), vec!["first", "second"]);
        assert_eq!(cand.renderings("path/to/doc.pdf", 2).unwrap(), vec!["page two"]);
        assert!(matches!(
            cand.renderings("doc.pdf", 3),
            Err(AdapterError::Missing { page: 3, .. })
        ));
    }

    #[test]
    fn test_same_stem_in_different_folders_stays_separate() {
        let dir = tempfile::tempdir().unwrap();
        for (folder, text) in [("a", "from a"), ("b", "from b")] {
            std::fs::create_dir_all(dir.path().join(folder)).unwrap();
            std::fs::write(dir.path().join(folder).join("doc_pg1_repeat1.md"), text).unwrap();
        }

        let cand = DirectoryCandidate::open(dir.path()).unwrap();
        assert_eq!(cand.renderings("a/doc.pdf", 1).unwrap(), vec!["from a"]);
        assert_eq!(cand.renderings("./b/doc.pdf", 1).unwrap(), vec!["from b"]);
        assert!(matches!(
            cand.renderings("c/doc.pdf", 1),
            Err(AdapterError::Other(msg)) if msg.contains("a/doc") && msg.contains("b/doc")
        ));
    }

    #[test]
    fn test_pdf_key() {
        assert_eq!(pdf_key("doc.pdf"), "doc");
        assert_eq!(pdf_key("./a/b/doc.v2.pdf"), "a/b/doc.v2");
    }

    #[test]
    fn test_stem_with_underscores() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my_doc_v2_pg10_repeat1.md"), "x").unwrap();
        let cand = DirectoryCandidate::open(dir.path()).unwrap();
        assert_eq!(cand.renderings("my_doc_v2.pdf", 10).unwrap(), vec!["x"]);
    }

    #[test]
    fn test_missing_directory() {
        assert!(DirectoryCandidate::open(Path::new("/no/such/candidate")).is_err());
    }

    #[test]
    fn test_in_memory_candidate() {
        let cand = InMemoryCandidate::new("mem")
            .with("a.pdf", 1, "one")
            .with("a.pdf", 1, "two");
        assert_eq!(cand.renderings("a.pdf", 1).unwrap().len(), 2);
        assert!(cand.renderings("a.pdf", 2).is_err());
    }
}
