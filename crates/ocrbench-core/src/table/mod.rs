//! Table extraction from candidate renderings.
//!
//! Both pipe-delimited Markdown tables and HTML `<table>` blocks are turned
//! into a [`TableGrid`]: a rectangular array of positions, each pointing at
//! the cell that covers it. A cell with `rowspan`/`colspan` covers several
//! positions, so a lookup at any of them yields the originating cell.
//!
//! Parsing is best-effort. Ragged rows are padded and unterminated markup is
//! read up to the end of the text; what was repaired is recorded in
//! [`TableGrid::notes`].

mod html;
mod markdown;
pub mod relations;

use thiserror::Error;

pub use relations::evaluate_table;

/// Upper bound on a single cell's span; larger values are clipped.
pub const MAX_SPAN: usize = 1000;

/// Upper bound on rows x columns of one grid.
pub const MAX_GRID_POSITIONS: usize = 250_000;

/// A cell would grow the grid past [`MAX_GRID_POSITIONS`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("table would need {rows} x {cols} positions, limit is {MAX_GRID_POSITIONS}")]
pub struct GridTooLarge {
    pub rows: usize,
    pub cols: usize,
}

/// Which syntax a table was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSyntax {
    Markdown,
    Html,
}

/// One logical cell, positioned at its top-left grid coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCell {
    pub text: String,
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
    /// `<th>` or a Markdown header cell.
    pub is_header: bool,
}

impl TableCell {
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.row..self.row + self.row_span
    }

    pub fn cols(&self) -> std::ops::Range<usize> {
        self.col..self.col + self.col_span
    }
}

/// A parsed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    pub syntax: TableSyntax,
    /// Byte offset of the table in the source text.
    pub offset: usize,
    cells: Vec<TableCell>,
    /// `positions[row][col]` is an index into `cells`, `None` for a hole.
    positions: Vec<Vec<Option<usize>>>,
    header_rows: Vec<bool>,
    footer_rows: Vec<bool>,
    notes: Vec<String>,
}

impl TableGrid {
    pub fn num_rows(&self) -> usize {
        self.positions.len()
    }

    pub fn num_cols(&self) -> usize {
        self.positions.first().map_or(0, Vec::len)
    }

    /// Logical cells in document order.
    pub fn cells(&self) -> &[TableCell] {
        &self.cells
    }

    /// The cell covering `(row, col)`, if any.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<&TableCell> {
        let idx = (*self.positions.get(row)?.get(col)?)?;
        self.cells.get(idx)
    }

    /// Index of the cell covering `(row, col)`.
    pub fn index_at(&self, row: usize, col: usize) -> Option<usize> {
        *self.positions.get(row)?.get(col)?
    }

    pub fn is_header_row(&self, row: usize) -> bool {
        self.header_rows.get(row).copied().unwrap_or(false)
    }

    pub fn is_footer_row(&self, row: usize) -> bool {
        self.footer_rows.get(row).copied().unwrap_or(false)
    }

    pub fn has_header_rows(&self) -> bool {
        self.header_rows.iter().any(|h| *h)
    }

    pub fn has_footer_rows(&self) -> bool {
        self.footer_rows.iter().any(|f| *f)
    }

    /// Repairs made while parsing.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Text of every row, spanned cells repeated, for debugging output.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        (0..self.num_rows())
            .map(|r| {
                (0..self.num_cols())
                    .map(|c| self.cell_at(r, c).map(|cell| cell.text.clone()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Where a row came from inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowKind {
    Header,
    Body,
    Footer,
}

/// Incrementally places cells into an occupancy grid.
pub(crate) struct GridBuilder {
    syntax: TableSyntax,
    offset: usize,
    cells: Vec<TableCell>,
    positions: Vec<Vec<Option<usize>>>,
    /// Widest row so far.
    width: usize,
    row_kinds: Vec<RowKind>,
    notes: Vec<String>,
}

impl GridBuilder {
    pub(crate) fn new(syntax: TableSyntax, offset: usize) -> Self {
        Self {
            syntax,
            offset,
            cells: Vec::new(),
            positions: Vec::new(),
            width: 0,
            row_kinds: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub(crate) fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Begin a new row and return its index.
    pub(crate) fn start_row(&mut self, kind: RowKind) -> usize {
        let row = self.row_kinds.len();
        self.row_kinds.push(kind);
        self.ensure_rows(row + 1);
        row
    }

    fn ensure_rows(&mut self, rows: usize) {
        while self.positions.len() < rows {
            self.positions.push(Vec::new());
        }
    }

    /// Place a cell in `row` at the first column not already covered by a
    /// row-spanning cell from above. Nothing is placed if the grid would
    /// outgrow [`MAX_GRID_POSITIONS`].
    pub(crate) fn push_cell(
        &mut self,
        row: usize,
        text: String,
        row_span: usize,
        col_span: usize,
        is_header: bool,
    ) -> Result<(), GridTooLarge> {
        let row_span = row_span.clamp(1, MAX_SPAN);
        let col_span = col_span.clamp(1, MAX_SPAN);
        self.ensure_rows(row + 1);

        let mut col = 0;
        while matches!(self.positions[row].get(col), Some(Some(_))) {
            col += 1;
        }

        let rows = self.positions.len().max(row + row_span);
        let cols = self.width.max(col + col_span);
        if rows.saturating_mul(cols) > MAX_GRID_POSITIONS {
            return Err(GridTooLarge { rows, cols });
        }
        self.ensure_rows(row + row_span);
        self.width = cols;

        let idx = self.cells.len();
        self.cells.push(TableCell {
            text,
            row,
            col,
            row_span,
            col_span,
            is_header,
        });
        for r in row..row + row_span {
            let line = &mut self.positions[r];
            if line.len() < col + col_span {
                line.resize(col + col_span, None);
            }
            for slot in &mut line[col..col + col_span] {
                if slot.is_none() {
                    *slot = Some(idx);
                }
            }
        }
        Ok(())
    }

    /// Clip spans to the real row count, square up ragged rows.
    pub(crate) fn finish(mut self) -> Option<TableGrid> {
        let rows = self.row_kinds.len();
        if rows == 0 || self.cells.is_empty() {
            return None;
        }

        if self.positions.len() > rows {
            self.positions.truncate(rows);
            let mut clipped = 0;
            for cell in &mut self.cells {
                if cell.row + cell.row_span > rows {
                    cell.row_span = rows - cell.row;
                    clipped += 1;
                }
            }
            if clipped > 0 {
                self.notes
                    .push(format!("{clipped} rowspan(s) extend past the last row; clipped"));
            }
        }

        let width = self.positions.iter().map(Vec::len).max().unwrap_or(0);
        let mut ragged = Vec::new();
        for (r, line) in self.positions.iter_mut().enumerate() {
            let filled = line.iter().filter(|p| p.is_some()).count();
            if filled < width {
                ragged.push(r);
            }
            line.resize(width, None);
        }
        if !ragged.is_empty() {
            let shown: Vec<String> = ragged.iter().take(5).map(|r| r.to_string()).collect();
            self.notes.push(format!(
                "{} row(s) narrower than {} columns (rows {}{}); padded with empty cells",
                ragged.len(),
                width,
                shown.join(", "),
                if ragged.len() > 5 { ", ..." } else { "" }
            ));
        }

        Some(TableGrid {
            syntax: self.syntax,
            offset: self.offset,
            cells: self.cells,
            header_rows: self.row_kinds.iter().map(|k| *k == RowKind::Header).collect(),
            footer_rows: self.row_kinds.iter().map(|k| *k == RowKind::Footer).collect(),
            positions: self.positions,
            notes: self.notes,
        })
    }
}

/// Every Markdown and HTML table in `text`, in document order.
pub fn extract_tables(text: &str) -> Vec<TableGrid> {
    let mut tables = markdown::parse_markdown_tables(text);
    tables.extend(html::parse_html_tables(text));
    tables.sort_by_key(|t| t.offset);
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_expands_spans() {
        let mut b = GridBuilder::new(TableSyntax::Html, 0);
        let r0 = b.start_row(RowKind::Header);
        b.push_cell(r0, "A".into(), 2, 1, true).unwrap();
        b.push_cell(r0, "B".into(), 1, 2, true).unwrap();
        let r1 = b.start_row(RowKind::Body);
        b.push_cell(r1, "C".into(), 1, 1, false).unwrap();
        b.push_cell(r1, "D".into(), 1, 1, false).unwrap();
        let grid = b.finish().unwrap();

        assert_eq!(grid.num_rows(), 2);
        assert_eq!(grid.num_cols(), 3);
        assert_eq!(
            grid.to_rows(),
            vec![vec!["A", "B", "B"], vec!["A", "C", "D"]]
        );
        assert!(grid.notes().is_empty());
        assert!(grid.is_header_row(0));
        assert!(!grid.is_header_row(1));
    }

    #[test]
    fn test_builder_clips_rowspan_and_pads() {
        let mut b = GridBuilder::new(TableSyntax::Html, 0);
        let r0 = b.start_row(RowKind::Body);
        b.push_cell(r0, "A".into(), 5, 1, false).unwrap();
        b.push_cell(r0, "B".into(), 1, 1, false).unwrap();
        b.push_cell(r0, "C".into(), 1, 1, false).unwrap();
        let r1 = b.start_row(RowKind::Body);
        b.push_cell(r1, "D".into(), 1, 1, false).unwrap();
        let grid = b.finish().unwrap();

        assert_eq!(grid.num_rows(), 2);
        assert_eq!(grid.cell_at(0, 0).unwrap().row_span, 2);
        assert_eq!(grid.cell_at(1, 2), None);
        assert_eq!(grid.notes().len(), 2);
    }

    #[test]
    fn test_builder_refuses_oversized_grid() {
        let mut b = GridBuilder::new(TableSyntax::Html, 0);
        let r0 = b.start_row(RowKind::Body);
        b.push_cell(r0, "A".into(), 1, 2, false).unwrap();
        let err = b.push_cell(r0, "B".into(), MAX_SPAN, MAX_SPAN, false).unwrap_err();
        assert_eq!(err, GridTooLarge { rows: MAX_SPAN, cols: MAX_SPAN + 2 });

        let grid = b.finish().unwrap();
        assert_eq!((grid.num_rows(), grid.num_cols()), (1, 2));
        assert_eq!(grid.cells().len(), 1);
    }

    #[test]
    fn test_extract_mixed_in_document_order() {
        let text = "\
Intro\n\n<table><tr><td>h1</td></tr></table>\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let tables = extract_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].syntax, TableSyntax::Html);
        assert_eq!(tables[1].syntax, TableSyntax::Markdown);
    }
}
