//! HTML `<table>` blocks, with `rowspan`/`colspan` expansion.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use super::{GridBuilder, MAX_SPAN, RowKind, TableGrid, TableSyntax};

/// An opening or closing `table` tag; a tag cut off by the end of the text counts.
static TABLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/)?table\b[^>]*(?:>|$)").unwrap());

static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Outermost `<table>` blocks as `(start, end, terminated)` byte ranges.
/// Nested tables stay inside their parent's block; an unterminated table
/// runs to the end of the text.
fn table_blocks(text: &str) -> Vec<(usize, usize, bool)> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for caps in TABLE_TAG_RE.captures_iter(text) {
        let Some(tag) = caps.get(0) else { continue };
        if caps.get(1).is_none() {
            if depth == 0 {
                start = tag.start();
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 {
                blocks.push((start, tag.end(), true));
            }
        }
    }
    if depth > 0 {
        blocks.push((start, text.len(), false));
    }
    blocks
}

/// Find every HTML table in `text`, nested ones after their parent.
pub(crate) fn parse_html_tables(text: &str) -> Vec<TableGrid> {
    let mut tables = Vec::new();
    for (start, end, terminated) in table_blocks(text) {
        let fragment = Html::parse_fragment(&text[start..end]);
        for table in fragment.select(&TABLE_SEL) {
            if let Some(grid) = parse_table(table, start, terminated) {
                tables.push(grid);
            }
        }
    }
    tables
}

fn parse_table(table: ElementRef<'_>, offset: usize, terminated: bool) -> Option<TableGrid> {
    let mut builder = GridBuilder::new(TableSyntax::Html, offset);
    if !terminated {
        builder.note("unterminated <table>; read to end of text");
    }

    let rows = table_rows(table);
    let total_rows = rows.len();
    'rows: for (tr, kind) in rows {
        let cells: Vec<ElementRef> = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "td" | "th"))
            .collect();

        let all_th = !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th");
        let kind = if kind == RowKind::Body && all_th {
            RowKind::Header
        } else {
            kind
        };

        let row = builder.start_row(kind);
        let remaining = total_rows - row;
        for cell in cells {
            let el = cell.value();
            let row_span = match span_attr(el.attr("rowspan")) {
                // rowspan="0" runs to the end of the table
                Some(0) => remaining,
                Some(n) => n.min(remaining),
                None => 1,
            };
            let col_span = span_attr(el.attr("colspan")).unwrap_or(1).clamp(1, MAX_SPAN);
            if let Err(e) =
                builder.push_cell(row, cell_text(cell), row_span, col_span, el.name() == "th")
            {
                tracing::warn!(error = %e, "oversized html table truncated");
                builder.note(format!("{e}; rows from {row} on dropped"));
                break 'rows;
            }
        }
    }

    builder.finish()
}

/// Rows of `table` in document order, tagged by section. Nested tables are
/// not descended into.
fn table_rows(table: ElementRef<'_>) -> Vec<(ElementRef<'_>, RowKind)> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        let kind = match child.value().name() {
            "tr" => {
                rows.push((child, RowKind::Body));
                continue;
            }
            "thead" => RowKind::Header,
            "tbody" => RowKind::Body,
            "tfoot" => RowKind::Footer,
            _ => continue,
        };
        rows.extend(
            child
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|e| e.value().name() == "tr")
                .map(|tr| (tr, kind)),
        );
    }
    rows
}

fn span_attr(value: Option<&str>) -> Option<usize> {
    value?.trim().parse::<usize>().ok()
}

/// Visible text of a cell. Line breaks and block elements become spaces.
fn cell_text(cell: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if matches!(el.name(), "br" | "p" | "div" | "li") => out.push(' '),
            _ => {}
        }
    }
    WHITESPACE_RE.replace_all(&out, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MAX_GRID_POSITIONS;

    #[test]
    fn test_simple_table_with_header_section() {
        let text = "<table><thead><tr><th>Name</th><th>Value</th></tr></thead>\
                    <tbody><tr><td>alpha</td><td>1</td></tr></tbody></table>";
        let tables = parse_html_tables(text);
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.to_rows(), vec![vec!["Name", "Value"], vec!["alpha", "1"]]);
        assert!(t.is_header_row(0));
        assert!(!t.is_header_row(1));
        assert!(t.notes().is_empty());
    }

    #[test]
    fn test_rowspan_and_colspan_expand() {
        let text = r#"<table>
            <tr><th rowspan="2">Model</th><th colspan="2">Score</th></tr>
            <tr><th>A</th><th>B</th></tr>
            <tr><td>x</td><td>1</td><td>2</td></tr>
        </table>"#;
        let t = &parse_html_tables(text)[0];
        assert_eq!(
            t.to_rows(),
            vec![
                vec!["Model", "Score", "Score"],
                vec!["Model", "A", "B"],
                vec!["x", "1", "2"],
            ]
        );
        let model = t.cell_at(1, 0).unwrap();
        assert_eq!((model.row, model.col, model.row_span), (0, 0, 2));
        assert!(t.is_header_row(0) && t.is_header_row(1));
    }

    #[test]
    fn test_footer_rows_flagged() {
        let text = "<table><tr><td>1</td></tr><tfoot><tr><td>Total</td></tr></tfoot></table>";
        let t = &parse_html_tables(text)[0];
        assert!(t.is_footer_row(1));
        assert!(t.has_footer_rows());
    }

    #[test]
    fn test_unterminated_table_recovers_rows() {
        let text = "before <table><tr><td>a</td><td>b</td></tr><tr><td>c</td>";
        let t = &parse_html_tables(text)[0];
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.cell_at(1, 0).unwrap().text, "c");
        assert_eq!(t.cell_at(1, 1), None);
        assert!(t.notes().iter().any(|n| n.contains("unterminated")));
    }

    #[test]
    fn test_cell_text_breaks_and_entities() {
        let text = "<table><tr><td>line<br>two &amp; <b>three</b></td></tr></table>";
        let t = &parse_html_tables(text)[0];
        assert_eq!(t.cell_at(0, 0).unwrap().text, "line two & three");
    }

    #[test]
    fn test_bogus_spans_default_to_one() {
        let text = r#"<table><tr><td colspan="x" rowspan="-1">a</td><td>b</td></tr></table>"#;
        let t = &parse_html_tables(text)[0];
        assert_eq!(t.to_rows(), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_nested_table_keeps_outer_rows() {
        let text = "<table><tr><td>outer a</td><td><table><tr><td>inner</td></tr></table></td></tr>\
                    <tr><td>outer b</td><td>c</td></tr></table> after";
        let tables = parse_html_tables(text);
        assert_eq!(tables.len(), 2);
        let outer = &tables[0];
        assert_eq!(outer.num_rows(), 2);
        assert_eq!(outer.cell_at(1, 0).unwrap().text, "outer b");
        assert!(outer.notes().is_empty());
        assert_eq!(tables[1].to_rows(), vec![vec!["inner"]]);
    }

    #[test]
    fn test_table_blocks_track_depth() {
        let text = "<table><table></table></table>x<TABLE >";
        assert_eq!(table_blocks(text), vec![(0, 30, true), (31, 39, false)]);
    }

    #[test]
    fn test_rowspan_zero_runs_to_last_row() {
        let text = r#"<table><tr><td rowspan="0">A</td><td>1</td></tr><tr><td>2</td></tr></table>"#;
        let t = &parse_html_tables(text)[0];
        assert_eq!(t.to_rows(), vec![vec!["A", "1"], vec!["A", "2"]]);
        assert!(t.notes().is_empty());
    }

    #[test]
    fn test_oversized_table_is_truncated() {
        let row = r#"<tr><td colspan="1000">x</td></tr>"#;
        let text = format!("<table>{}</table>", row.repeat(400));
        let t = &parse_html_tables(&text)[0];
        assert!(t.num_rows() < 400);
        assert!(t.num_rows() * t.num_cols() <= MAX_GRID_POSITIONS + t.num_cols());
        assert!(t.notes().iter().any(|n| n.contains("limit")));
    }

    #[test]
    fn test_two_tables_found() {
        let text = "<table><tr><td>1</td></tr></table> mid <TABLE><tr><td>2</td></tr></TABLE>";
        assert_eq!(parse_html_tables(text).len(), 2);
    }
}
