//! Fact model: one machine-checkable assertion about one page of one PDF.
//!
//! Facts arrive as loosely-typed JSON objects ([`RawFact`]) and are checked
//! field-by-field into the strongly-typed [`Fact`]. A malformed definition is
//! a fixture error ([`FactError`]), never a crash.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::default_max_diffs;

/// Default cap on how often the tail n-gram of a rendering may repeat.
pub const DEFAULT_MAX_REPEATS: usize = 30;

/// The kind of assertion a fact makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Present,
    Absent,
    Order,
    Table,
    Math,
    Baseline,
}

impl FactType {
    pub const ALL: [FactType; 6] = [
        FactType::Present,
        FactType::Absent,
        FactType::Order,
        FactType::Table,
        FactType::Math,
        FactType::Baseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Present => "present",
            FactType::Absent => "absent",
            FactType::Order => "order",
            FactType::Table => "table",
            FactType::Math => "math",
            FactType::Baseline => "baseline",
        }
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FactType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Errors in a fact definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("{id}: missing required field `{field}`")]
    MissingField { id: String, field: &'static str },
    #[error("{id}: field `{field}` must not be empty")]
    EmptyField { id: String, field: &'static str },
    #[error("{id}: page must be >= 1 (got {page})")]
    InvalidPage { id: String, page: i64 },
    #[error("{id}: unknown fact type `{kind}`")]
    UnknownType { id: String, kind: String },
    #[error("{id}: duplicate fact id")]
    DuplicateId { id: String },
    #[error("{id}: {message}")]
    Invalid { id: String, message: String },
}

/// Presence/absence of a text span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFact {
    pub text: String,
    pub max_diffs: usize,
    pub case_sensitive: bool,
    pub first_n: Option<usize>,
    pub last_n: Option<usize>,
}

/// `before` must be read ahead of `after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFact {
    pub before: String,
    pub after: String,
    pub before_max_diffs: usize,
    pub after_max_diffs: usize,
    pub case_sensitive: bool,
}

/// Neighbourhood of one table cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableFact {
    pub cell: String,
    pub up: Option<String>,
    pub down: Option<String>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub top_heading: Option<String>,
    pub bottom_heading: Option<String>,
    pub left_heading: Option<String>,
    pub max_diffs: usize,
}

impl TableFact {
    /// Every neighbour constraint the fact actually specifies.
    pub fn constraints(&self) -> Vec<(Relation, &str)> {
        [
            (Relation::Up, &self.up),
            (Relation::Down, &self.down),
            (Relation::Left, &self.left),
            (Relation::Right, &self.right),
            (Relation::TopHeading, &self.top_heading),
            (Relation::BottomHeading, &self.bottom_heading),
            (Relation::LeftHeading, &self.left_heading),
        ]
        .into_iter()
        .filter_map(|(rel, v)| v.as_deref().map(|s| (rel, s)))
        .collect()
    }
}

/// Directions a table fact can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Up,
    Down,
    Left,
    Right,
    TopHeading,
    BottomHeading,
    LeftHeading,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Up => "up",
            Relation::Down => "down",
            Relation::Left => "left",
            Relation::Right => "right",
            Relation::TopHeading => "top_heading",
            Relation::BottomHeading => "bottom_heading",
            Relation::LeftHeading => "left_heading",
        }
    }
}

/// A LaTeX equation that must appear among the rendering's math spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathFact {
    pub math: String,
}

/// Page-level sanity checks on a rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineFact {
    pub max_repeats: usize,
    /// When set, the page is expected to be (nearly) blank.
    pub max_length: Option<usize>,
    pub check_disallowed_characters: bool,
}

impl Default for BaselineFact {
    fn default() -> Self {
        Self {
            max_repeats: DEFAULT_MAX_REPEATS,
            max_length: None,
            check_disallowed_characters: true,
        }
    }
}

/// Type-specific payload of a fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactKind {
    Present(TextFact),
    Absent(TextFact),
    Order(OrderFact),
    Table(TableFact),
    Math(MathFact),
    Baseline(BaselineFact),
}

/// A validated fact. The kind is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub pdf: String,
    /// 1-based page number.
    pub page: u32,
    pub id: String,
    kind: FactKind,
}

impl Fact {
    pub fn new(pdf: impl Into<String>, page: u32, id: impl Into<String>, kind: FactKind) -> Self {
        Self {
            pdf: pdf.into(),
            page,
            id: id.into(),
            kind,
        }
    }

    /// Default baseline check for one page, id `<pdf>_baseline`.
    pub fn baseline(pdf: &str, page: u32) -> Self {
        Self::new(
            pdf,
            page,
            format!("{pdf}_baseline"),
            FactKind::Baseline(BaselineFact::default()),
        )
    }

    pub fn kind(&self) -> &FactKind {
        &self.kind
    }

    pub fn fact_type(&self) -> FactType {
        match self.kind {
            FactKind::Present(_) => FactType::Present,
            FactKind::Absent(_) => FactType::Absent,
            FactKind::Order(_) => FactType::Order,
            FactKind::Table(_) => FactType::Table,
            FactKind::Math(_) => FactType::Math,
            FactKind::Baseline(_) => FactType::Baseline,
        }
    }

    /// Short human description of what the fact asserts, for reports.
    pub fn describe(&self) -> String {
        match &self.kind {
            FactKind::Present(t) => format!("present: \"{}\"", t.text),
            FactKind::Absent(t) => format!("absent: \"{}\"", t.text),
            FactKind::Order(o) => format!("order: \"{}\" before \"{}\"", o.before, o.after),
            FactKind::Table(t) => format!("table cell: \"{}\"", t.cell),
            FactKind::Math(m) => format!("math: {}", m.math),
            FactKind::Baseline(_) => "baseline".to_string(),
        }
    }
}

/// Fact as it appears on disk: every field optional, unknown fields ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diffs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub math: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_repeats: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_disallowed_characters: Option<bool>,
}

fn required(value: Option<String>, id: &str, field: &'static str) -> Result<String, FactError> {
    match value {
        None => Err(FactError::MissingField {
            id: id.to_string(),
            field,
        }),
        Some(v) if v.trim().is_empty() => Err(FactError::EmptyField {
            id: id.to_string(),
            field,
        }),
        Some(v) => Ok(v),
    }
}

/// Blank neighbour strings count as "not specified".
fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive_window(value: Option<usize>, id: &str, field: &str) -> Result<Option<usize>, FactError> {
    match value {
        Some(0) => Err(FactError::Invalid {
            id: id.to_string(),
            message: format!("`{field}` must be > 0"),
        }),
        other => Ok(other),
    }
}

impl TryFrom<RawFact> for Fact {
    type Error = FactError;

    fn try_from(raw: RawFact) -> Result<Self, Self::Error> {
        let id = match raw.id {
            Some(ref id) if !id.trim().is_empty() => id.clone(),
            _ => {
                return Err(FactError::MissingField {
                    id: "<unnamed>".to_string(),
                    field: "id",
                });
            }
        };
        let pdf = required(raw.pdf, &id, "pdf")?;
        let page = match raw.page {
            None => {
                return Err(FactError::MissingField {
                    id,
                    field: "page",
                });
            }
            Some(p) if p < 1 || p > i64::from(u32::MAX) => {
                return Err(FactError::InvalidPage { id, page: p });
            }
            Some(p) => p as u32,
        };
        let type_name = required(raw.fact_type, &id, "type")?;
        let fact_type = FactType::from_str(&type_name).map_err(|kind| FactError::UnknownType {
            id: id.clone(),
            kind,
        })?;

        let kind = match fact_type {
            FactType::Present | FactType::Absent => {
                let text = required(raw.text, &id, "text")?;
                let fact = TextFact {
                    max_diffs: raw
                        .max_diffs
                        .unwrap_or_else(|| default_max_diffs(text.chars().count())),
                    text,
                    case_sensitive: raw.case_sensitive.unwrap_or(true),
                    first_n: positive_window(raw.first_n, &id, "first_n")?,
                    last_n: positive_window(raw.last_n, &id, "last_n")?,
                };
                if fact_type == FactType::Present {
                    FactKind::Present(fact)
                } else {
                    FactKind::Absent(fact)
                }
            }
            FactType::Order => {
                let before = required(raw.before, &id, "before")?;
                let after = required(raw.after, &id, "after")?;
                let before_max_diffs = raw
                    .max_diffs
                    .unwrap_or_else(|| default_max_diffs(before.chars().count()));
                let after_max_diffs = raw
                    .max_diffs
                    .unwrap_or_else(|| default_max_diffs(after.chars().count()));
                FactKind::Order(OrderFact {
                    before,
                    after,
                    before_max_diffs,
                    after_max_diffs,
                    case_sensitive: raw.case_sensitive.unwrap_or(true),
                })
            }
            FactType::Table => FactKind::Table(TableFact {
                cell: required(raw.cell, &id, "cell")?,
                up: optional(raw.up),
                down: optional(raw.down),
                left: optional(raw.left),
                right: optional(raw.right),
                top_heading: optional(raw.top_heading),
                bottom_heading: optional(raw.bottom_heading),
                left_heading: optional(raw.left_heading),
                max_diffs: raw.max_diffs.unwrap_or(0),
            }),
            FactType::Math => FactKind::Math(MathFact {
                math: required(raw.math, &id, "math")?,
            }),
            FactType::Baseline => FactKind::Baseline(BaselineFact {
                max_repeats: raw.max_repeats.unwrap_or(DEFAULT_MAX_REPEATS),
                max_length: raw.max_length,
                check_disallowed_characters: raw.check_disallowed_characters.unwrap_or(true),
            }),
        };

        Ok(Fact {
            pdf,
            page,
            id,
            kind,
        })
    }
}

impl From<&Fact> for RawFact {
    fn from(fact: &Fact) -> Self {
        let mut raw = RawFact {
            pdf: Some(fact.pdf.clone()),
            page: Some(i64::from(fact.page)),
            id: Some(fact.id.clone()),
            fact_type: Some(fact.fact_type().as_str().to_string()),
            ..Default::default()
        };
        match &fact.kind {
            FactKind::Present(t) | FactKind::Absent(t) => {
                raw.text = Some(t.text.clone());
                raw.max_diffs = Some(t.max_diffs);
                raw.case_sensitive = (!t.case_sensitive).then_some(false);
                raw.first_n = t.first_n;
                raw.last_n = t.last_n;
            }
            FactKind::Order(o) => {
                raw.before = Some(o.before.clone());
                raw.after = Some(o.after.clone());
                // Differing tolerances can only come from per-side defaults,
                // which are re-derived on load.
                raw.max_diffs = (o.before_max_diffs == o.after_max_diffs).then_some(o.before_max_diffs);
                raw.case_sensitive = (!o.case_sensitive).then_some(false);
            }
            FactKind::Table(t) => {
                raw.cell = Some(t.cell.clone());
                raw.up = t.up.clone();
                raw.down = t.down.clone();
                raw.left = t.left.clone();
                raw.right = t.right.clone();
                raw.top_heading = t.top_heading.clone();
                raw.bottom_heading = t.bottom_heading.clone();
                raw.left_heading = t.left_heading.clone();
                raw.max_diffs = Some(t.max_diffs);
            }
            FactKind::Math(m) => raw.math = Some(m.math.clone()),
            FactKind::Baseline(b) => {
                raw.max_repeats = Some(b.max_repeats);
                raw.max_length = b.max_length;
                raw.check_disallowed_characters = Some(b.check_disallowed_characters);
            }
        }
        raw
    }
}

/// Parse one JSON object into a validated fact.
pub fn parse_fact(json: &str) -> Result<Fact, FactError> {
    let raw: RawFact = serde_json::from_str(json).map_err(|e| FactError::Json(e.to_string()))?;
    Fact::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_present_with_explicit_tolerance() {
        let fact = parse_fact(
            r#"{"pdf":"doc.pdf","page":1,"id":"doc_present_01","type":"present","text":"Hello world","max_diffs":2,"checked":"verified"}"#,
        )
        .unwrap();
        assert_eq!(fact.fact_type(), FactType::Present);
        match fact.kind() {
            FactKind::Present(t) => {
                assert_eq!(t.text, "Hello world");
                assert_eq!(t.max_diffs, 2);
                assert!(t.case_sensitive);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_max_diffs_derived_when_missing() {
        let text = "a".repeat(100);
        let json = format!(r#"{{"pdf":"d.pdf","page":2,"id":"x","type":"absent","text":"{text}"}}"#);
        let fact = parse_fact(&json).unwrap();
        match fact.kind() {
            FactKind::Absent(t) => assert_eq!(t.max_diffs, 5),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_order_sides_derive_separately() {
        let long = "b".repeat(80);
        let json = format!(
            r#"{{"pdf":"d.pdf","page":1,"id":"o","type":"order","before":"short text","after":"{long}"}}"#
        );
        match parse_fact(&json).unwrap().kind() {
            FactKind::Order(o) => {
                assert_eq!(o.before_max_diffs, 1);
                assert_eq!(o.after_max_diffs, 4);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_missing_type_specific_field() {
        let err = parse_fact(r#"{"pdf":"d.pdf","page":1,"id":"t1","type":"table"}"#).unwrap_err();
        assert_eq!(
            err,
            FactError::MissingField {
                id: "t1".into(),
                field: "cell"
            }
        );
    }

    #[test]
    fn test_empty_text_rejected() {
        let err =
            parse_fact(r#"{"pdf":"d.pdf","page":1,"id":"p","type":"present","text":"   "}"#).unwrap_err();
        assert!(matches!(err, FactError::EmptyField { field: "text", .. }));
    }

    #[test]
    fn test_bad_page_and_type() {
        let err = parse_fact(r#"{"pdf":"d.pdf","page":0,"id":"p","type":"present","text":"x"}"#).unwrap_err();
        assert!(matches!(err, FactError::InvalidPage { page: 0, .. }));
        let err = parse_fact(r#"{"pdf":"d.pdf","page":1,"id":"p","type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, FactError::UnknownType { .. }));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_fact("{not json"), Err(FactError::Json(_))));
    }

    #[test]
    fn test_table_null_neighbours_ignored() {
        let fact = parse_fact(
            r#"{"pdf":"d.pdf","page":1,"id":"t","type":"table","cell":"3.32T","up":null,"left":"3.71T","top_heading":"Words","left_heading":""}"#,
        )
        .unwrap();
        match fact.kind() {
            FactKind::Table(t) => {
                let rels: Vec<_> = t.constraints().into_iter().map(|(r, _)| r).collect();
                assert_eq!(rels, vec![Relation::Left, Relation::TopHeading]);
                assert_eq!(t.max_diffs, 0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_raw_round_trip_preserves_meaning() {
        let original = parse_fact(
            r#"{"pdf":"d.pdf","page":3,"id":"o","type":"order","before":"first","after":"second","max_diffs":1,"case_sensitive":false}"#,
        )
        .unwrap();
        let raw = RawFact::from(&original);
        let again = Fact::try_from(raw).unwrap();
        assert_eq!(again, original);
    }

    #[test]
    fn test_baseline_defaults() {
        let fact = Fact::baseline("doc.pdf", 1);
        assert_eq!(fact.id, "doc.pdf_baseline");
        assert_eq!(fact.kind(), &FactKind::Baseline(BaselineFact::default()));
    }
}
