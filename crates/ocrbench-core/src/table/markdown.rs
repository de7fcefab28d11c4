//! Pipe-delimited Markdown tables: a header row, a `---` separator row, then
//! body rows until the first line without a pipe.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{GridBuilder, RowKind, TableGrid, TableSyntax};

static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?\s*$").unwrap());

fn is_separator(line: &str) -> bool {
    line.contains('|') && SEPARATOR_RE.is_match(line)
}

fn is_row(line: &str) -> bool {
    !line.trim().is_empty() && line.contains('|')
}

/// Split one table line into trimmed cell texts. `\|` is a literal pipe.
fn split_row(line: &str) -> Vec<String> {
    let mut trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix('|') {
        trimmed = rest;
    }
    if trimmed.ends_with('|') && !trimmed.ends_with("\\|") {
        trimmed = &trimmed[..trimmed.len() - 1];
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Find every Markdown table in `text`.
pub(crate) fn parse_markdown_tables(text: &str) -> Vec<TableGrid> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        lines.push((offset, line.trim_end_matches(['\n', '\r'])));
        offset += line.len();
    }

    let mut tables = Vec::new();
    let mut i = 0;
    while i + 1 < lines.len() {
        let (start, header) = lines[i];
        let separator = lines[i + 1].1;
        if !(is_row(header) && is_separator(separator)) {
            i += 1;
            continue;
        }

        let mut builder = GridBuilder::new(TableSyntax::Markdown, start);
        let header_cells = split_row(header);
        let width = header_cells.len();
        let sep_width = split_row(separator).len();
        if sep_width != width {
            builder.note(format!(
                "separator has {sep_width} columns, header has {width}"
            ));
        }

        let mut truncated = false;
        let row = builder.start_row(RowKind::Header);
        for cell in header_cells {
            if let Err(e) = builder.push_cell(row, cell, 1, 1, true) {
                builder.note(format!("{e}; header cut short"));
                truncated = true;
                break;
            }
        }

        let mut j = i + 2;
        while j < lines.len() && is_row(lines[j].1) && !is_separator(lines[j].1) {
            j += 1;
            if truncated {
                continue;
            }
            let cells = split_row(lines[j - 1].1);
            let row = builder.start_row(RowKind::Body);
            if cells.len() > width {
                builder.note(format!(
                    "row {row} has {} cells, header has {width}",
                    cells.len()
                ));
            }
            for cell in cells {
                if let Err(e) = builder.push_cell(row, cell, 1, 1, false) {
                    tracing::warn!(error = %e, "oversized markdown table truncated");
                    builder.note(format!("{e}; rows from {row} on dropped"));
                    truncated = true;
                    break;
                }
            }
        }

        if let Some(grid) = builder.finish() {
            tables.push(grid);
        }
        i = j;
    }
    tables
}
