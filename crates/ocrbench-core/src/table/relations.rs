//! Cell-neighbourhood checks for table facts.
//!
//! A table fact names a cell and, optionally, what must sit next to it. Every
//! grid cell whose text matches the target is a candidate; the candidate that
//! satisfies the most constraints is the one reported. When several cells
//! match, the explanation says so.

use crate::evaluate::Verdict;
use crate::facts::{Relation, TableFact};
use crate::matching::{default_max_diffs, similarity, text_matches};
use crate::normalize::normalize_text;

use super::{TableCell, TableGrid};

/// Normalized expected text with its edit tolerance.
struct Expected {
    raw: String,
    text: String,
    tolerance: usize,
}

impl Expected {
    fn new(raw: &str, extra_diffs: usize) -> Self {
        let text = normalize_text(raw);
        let tolerance = default_max_diffs(text.chars().count()) + extra_diffs;
        Self {
            raw: raw.to_string(),
            text,
            tolerance,
        }
    }

    fn matches(&self, cell_text: &str) -> Option<usize> {
        text_matches(&normalize_text(cell_text), &self.text, self.tolerance)
    }
}

/// Result of one neighbour constraint for one candidate cell.
struct Check {
    relation: Relation,
    satisfied: bool,
    found: Vec<String>,
}

struct Candidate {
    table: usize,
    cell: usize,
    distance: usize,
    similarity: f64,
    checks: Vec<Check>,
}

impl Candidate {
    fn satisfied(&self) -> usize {
        self.checks.iter().filter(|c| c.satisfied).count()
    }

    fn all_satisfied(&self) -> bool {
        self.checks.iter().all(|c| c.satisfied)
    }

    /// Strict preference: more constraints met, then closer text.
    fn better_than(&self, other: &Candidate) -> bool {
        let (a, b) = (self.satisfied(), other.satisfied());
        if a != b {
            return a > b;
        }
        if self.distance != other.distance {
            return self.distance < other.distance;
        }
        self.similarity > other.similarity
    }
}

fn push_unique(out: &mut Vec<usize>, idx: Option<usize>) {
    if let Some(idx) = idx
        && !out.contains(&idx)
    {
        out.push(idx);
    }
}

fn non_empty(grid: &TableGrid, row: usize, col: usize) -> Option<usize> {
    let idx = grid.index_at(row, col)?;
    let cell = grid.cells().get(idx)?;
    (!cell.text.trim().is_empty()).then_some(idx)
}

/// Cells standing in `relation` to `cell`. Spans are honoured: a cell two
/// columns wide has two upper neighbours.
pub fn neighbours<'g>(grid: &'g TableGrid, cell: &TableCell, relation: Relation) -> Vec<&'g TableCell> {
    let mut idxs = Vec::new();
    let below = cell.row + cell.row_span;
    let right = cell.col + cell.col_span;

    match relation {
        Relation::Up => {
            if cell.row > 0 {
                for c in cell.cols() {
                    push_unique(&mut idxs, grid.index_at(cell.row - 1, c));
                }
            }
        }
        Relation::Down => {
            for c in cell.cols() {
                push_unique(&mut idxs, grid.index_at(below, c));
            }
        }
        Relation::Left => {
            if cell.col > 0 {
                for r in cell.rows() {
                    push_unique(&mut idxs, grid.index_at(r, cell.col - 1));
                }
            }
        }
        Relation::Right => {
            for r in cell.rows() {
                push_unique(&mut idxs, grid.index_at(r, right));
            }
        }
        Relation::TopHeading => {
            for c in cell.cols() {
                if grid.has_header_rows() {
                    for r in (0..cell.row).filter(|r| grid.is_header_row(*r)) {
                        push_unique(&mut idxs, non_empty(grid, r, c));
                    }
                } else {
                    let first = (0..cell.row).find_map(|r| non_empty(grid, r, c));
                    push_unique(&mut idxs, first);
                }
            }
        }
        Relation::BottomHeading => {
            for c in cell.cols() {
                if grid.has_footer_rows() {
                    for r in (below..grid.num_rows()).filter(|r| grid.is_footer_row(*r)) {
                        push_unique(&mut idxs, non_empty(grid, r, c));
                    }
                } else {
                    let last = (below..grid.num_rows()).rev().find_map(|r| non_empty(grid, r, c));
                    push_unique(&mut idxs, last);
                }
            }
        }
        Relation::LeftHeading => {
            for r in cell.rows() {
                let first = (0..cell.col).find_map(|c| non_empty(grid, r, c));
                push_unique(&mut idxs, first);
            }
        }
    }

    idxs.into_iter().filter_map(|i| grid.cells().get(i)).collect()
}

fn check(grid: &TableGrid, cell: &TableCell, relation: Relation, expected: &Expected) -> Check {
    let found = neighbours(grid, cell, relation);
    Check {
        relation,
        satisfied: found.iter().any(|n| expected.matches(&n.text).is_some()),
        found: found.into_iter().map(|n| n.text.clone()).collect(),
    }
}

fn describe_found(found: &[String]) -> String {
    if found.is_empty() {
        "nothing".to_string()
    } else {
        found
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Check a table fact against every table in a rendering.
pub fn evaluate_table(tables: &[TableGrid], fact: &TableFact) -> Verdict {
    if tables.is_empty() {
        return Verdict::fail("no tables found in rendering");
    }

    let target = Expected::new(&fact.cell, fact.max_diffs);
    let constraints: Vec<(Relation, Expected)> = fact
        .constraints()
        .into_iter()
        .map(|(rel, text)| (rel, Expected::new(text, fact.max_diffs)))
        .collect();

    let mut candidates = Vec::new();
    for (ti, grid) in tables.iter().enumerate() {
        for (ci, cell) in grid.cells().iter().enumerate() {
            let Some(distance) = target.matches(&cell.text) else {
                continue;
            };
            candidates.push(Candidate {
                table: ti,
                cell: ci,
                distance,
                similarity: similarity(&normalize_text(&cell.text), &target.text),
                checks: constraints
                    .iter()
                    .map(|(rel, exp)| check(grid, cell, *rel, exp))
                    .collect(),
            });
        }
    }

    if candidates.is_empty() {
        let closest = tables
            .iter()
            .flat_map(|t| t.cells())
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| (similarity(&normalize_text(&c.text), &target.text), &c.text))
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let mut msg = format!(
            "cell \"{}\" not found in {} table(s)",
            target.raw,
            tables.len()
        );
        if let Some((_, text)) = closest {
            msg.push_str(&format!("; closest cell: \"{text}\""));
        }
        return Verdict::fail(msg);
    }

    let mut best = 0;
    for i in 1..candidates.len() {
        if candidates[i].better_than(&candidates[best]) {
            best = i;
        }
    }
    let best = &candidates[best];
    let grid = &tables[best.table];
    let cell = &grid.cells()[best.cell];
    let location = format!(
        "table {}, row {}, column {}",
        best.table + 1,
        cell.row + 1,
        cell.col + 1
    );

    let fully = candidates.iter().filter(|c| c.all_satisfied()).count();
    let ambiguity = (candidates.len() > 1).then(|| {
        tracing::debug!(
            cell = %target.raw,
            candidates = candidates.len(),
            fully_satisfied = fully,
            "ambiguous table cell match"
        );
        format!(
            "{} cells match \"{}\", {} satisfy every constraint; reported the best",
            candidates.len(),
            target.raw,
            fully
        )
    });

    if best.all_satisfied() {
        let mut msg = format!("cell \"{}\" found at {location}", cell.text);
        if let Some(note) = ambiguity {
            msg.push_str("; ");
            msg.push_str(&note);
        }
        return Verdict::pass(msg);
    }

    let failures: Vec<String> = best
        .checks
        .iter()
        .zip(&constraints)
        .filter(|(c, _)| !c.satisfied)
        .map(|(c, (_, exp))| {
            format!(
                "{} expected \"{}\", found {}",
                c.relation.as_str(),
                exp.raw,
                describe_found(&c.found)
            )
        })
        .collect();
    let mut msg = format!(
        "cell \"{}\" found at {location} but {}",
        cell.text,
        failures.join("; ")
    );
    if let Some(note) = ambiguity {
        msg.push_str(&format!(" ({note})"));
    }
    if !grid.notes().is_empty() {
        msg.push_str(&format!(" [table repaired: {}]", grid.notes().join("; ")));
    }
    Verdict::fail(msg)
}
