//! Semantic table comparison
//!
//! Two tables are equal when they hold the same values, regardless of column
//! order, header case and padding, row order (unless the policy says
//! otherwise), decimal mark, null spelling, or whether a number is stored as
//! text. Each participating column is coerced once, to the narrowest type
//! that every non-null cell on both sides converts to: integer, then real,
//! then date/time, then text.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use odp_common::artifact::comma_decimal_to_dot;
use odp_common::{Cell, Column, Table};

/// Spellings of "no value" treated as null by default (case-insensitive)
pub const DEFAULT_NULL_TOKENS: [&str; 4] = ["", "nan", "None", ":"];

/// Reals are rounded to this many decimals before comparison
pub const ROUND_DIGITS: i32 = 10;

const MAX_SAMPLES: usize = 5;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

/// What counts as a difference
#[derive(Debug, Clone, PartialEq)]
pub struct ComparePolicy {
    /// Compare only these columns (matched case-insensitively)
    pub value_columns: Option<Vec<String>>,
    /// Drop columns whose name contains any of these (case-insensitive)
    pub ignore_patterns: Vec<String>,
    /// Largest numeric difference still considered equal
    pub numeric_tolerance: f64,
    /// Read `12,5` as `12.5`
    pub decimal_symbol_equivalence: bool,
    pub null_equivalence: Vec<String>,
    pub row_order_sensitive: bool,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            value_columns: None,
            ignore_patterns: Vec::new(),
            numeric_tolerance: 0.0,
            decimal_symbol_equivalence: true,
            null_equivalence: DEFAULT_NULL_TOKENS.iter().map(|s| s.to_string()).collect(),
            row_order_sensitive: false,
        }
    }
}

impl ComparePolicy {
    pub fn value_columns(mut self, columns: &[&str]) -> Self {
        self.value_columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.numeric_tolerance = tolerance.abs();
        self
    }

    pub fn decimal_symbol_equivalence(mut self, enabled: bool) -> Self {
        self.decimal_symbol_equivalence = enabled;
        self
    }

    pub fn null_equivalence(mut self, tokens: &[&str]) -> Self {
        self.null_equivalence = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn row_order_sensitive(mut self, sensitive: bool) -> Self {
        self.row_order_sensitive = sensitive;
        self
    }
}

/// Result of a comparison, with enough detail to log why tables differ
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equal,
    /// Participating column sets differ (names as they appear in each table)
    Columns {
        added: Vec<String>,
        removed: Vec<String>,
    },
    RowCount { old: usize, new: usize },
    Values {
        changed_rows: usize,
        /// Up to five `column: old → new` descriptions
        samples: Vec<String>,
    },
}

impl Comparison {
    pub fn is_equal(&self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal => write!(f, "tables are equal"),
            Comparison::Columns { added, removed } => write!(
                f,
                "columns differ (added: [{}], removed: [{}])",
                added.join(", "),
                removed.join(", ")
            ),
            Comparison::RowCount { old, new } => {
                write!(f, "row count changed from {old} to {new}")
            },
            Comparison::Values {
                changed_rows,
                samples,
            } => write!(f, "{changed_rows} row(s) changed: {}", samples.join(" | ")),
        }
    }
}

/// A cell after coercion
#[derive(Debug, Clone, PartialEq)]
enum Norm {
    Int(i64),
    Real(f64),
    Moment(NaiveDateTime),
    Text(String),
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Norm::Int(v) => write!(f, "{v}"),
            Norm::Real(v) => write!(f, "{v}"),
            Norm::Moment(v) => write!(f, "{v}"),
            Norm::Text(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coercion {
    Int,
    Real,
    Moment,
    Text,
}

/// Policy with its string lists pre-normalized
struct Rules<'p> {
    policy: &'p ComparePolicy,
    nulls: Vec<String>,
}

impl<'p> Rules<'p> {
    fn new(policy: &'p ComparePolicy) -> Self {
        Self {
            policy,
            nulls: policy
                .null_equivalence
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
        }
    }

    fn is_null(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Str(s) => {
                let token = s.trim().to_lowercase();
                self.nulls.iter().any(|n| *n == token)
            },
            other => other.is_null(),
        }
    }

    fn as_int(&self, cell: &Cell) -> Option<i64> {
        match cell {
            Cell::Int(v) => Some(*v),
            Cell::Real(v) if v.fract() == 0.0 && v.abs() < 9.0e18 => Some(*v as i64),
            Cell::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_real(&self, cell: &Cell) -> Option<f64> {
        match cell {
            Cell::Int(v) => Some(*v as f64),
            Cell::Real(v) if v.is_finite() => Some(*v),
            Cell::Str(s) => {
                let text = s.trim();
                let normalized = if self.policy.decimal_symbol_equivalence {
                    comma_decimal_to_dot(text)
                } else {
                    None
                };
                let text = normalized.as_deref().unwrap_or(text);
                if !text.bytes().any(|b| b.is_ascii_digit()) {
                    return None;
                }
                text.parse::<f64>().ok().filter(|v| v.is_finite())
            },
            _ => None,
        }
    }

    fn as_moment(&self, cell: &Cell) -> Option<NaiveDateTime> {
        match cell {
            Cell::Date(d) => d.and_hms_opt(0, 0, 0),
            Cell::Timestamp(t) => Some(*t),
            Cell::Str(s) => {
                let text = s.trim();
                DATETIME_FORMATS
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                    .or_else(|| {
                        DATE_FORMATS
                            .iter()
                            .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            },
            _ => None,
        }
    }

    fn coercion(&self, old: &Column, new: &Column) -> Coercion {
        let cells: Vec<&Cell> = old
            .cells()
            .iter()
            .chain(new.cells())
            .filter(|c| !self.is_null(c))
            .collect();
        if cells.is_empty() {
            Coercion::Text
        } else if cells.iter().all(|c| self.as_int(c).is_some()) {
            Coercion::Int
        } else if cells.iter().all(|c| self.as_real(c).is_some()) {
            Coercion::Real
        } else if cells.iter().all(|c| self.as_moment(c).is_some()) {
            Coercion::Moment
        } else {
            Coercion::Text
        }
    }

    fn normalize(&self, cell: &Cell, coercion: Coercion) -> Option<Norm> {
        if self.is_null(cell) {
            return None;
        }
        let coerced = match coercion {
            Coercion::Int => self.as_int(cell).map(Norm::Int),
            Coercion::Real => self.as_real(cell).map(|v| Norm::Real(round(v))),
            Coercion::Moment => self.as_moment(cell).map(Norm::Moment),
            Coercion::Text => None,
        };
        Some(coerced.unwrap_or_else(|| Norm::Text(text_of(cell))))
    }
}

fn text_of(cell: &Cell) -> String {
    match cell {
        Cell::Str(s) => s.trim().to_string(),
        other => other.to_canonical(),
    }
}

fn round(value: f64) -> f64 {
    let factor = 10f64.powi(ROUND_DIGITS);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Columns taking part in the comparison, keyed by normalized name
fn participating<'t>(table: &'t Table, policy: &ComparePolicy) -> Vec<(String, &'t Column)> {
    let wanted: Option<HashSet<String>> = policy
        .value_columns
        .as_ref()
        .map(|columns| columns.iter().map(|c| normalize_name(c)).collect());
    let ignored: Vec<String> = policy
        .ignore_patterns
        .iter()
        .map(|p| normalize_name(p))
        .filter(|p| !p.is_empty())
        .collect();

    let mut seen = HashSet::new();
    table
        .columns()
        .iter()
        .filter_map(|column| {
            let key = normalize_name(column.name());
            if ignored.iter().any(|p| key.contains(p.as_str())) {
                return None;
            }
            if wanted.as_ref().is_some_and(|w| !w.contains(&key)) {
                return None;
            }
            seen.insert(key.clone()).then_some((key, column))
        })
        .collect()
}

fn cmp_norm(a: &Option<Norm>, b: &Option<Norm>) -> Ordering {
    fn rank(n: &Norm) -> u8 {
        match n {
            Norm::Int(_) => 0,
            Norm::Real(_) => 1,
            Norm::Moment(_) => 2,
            Norm::Text(_) => 3,
        }
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Norm::Int(x)), Some(Norm::Int(y))) => x.cmp(y),
        (Some(Norm::Real(x)), Some(Norm::Real(y))) => x.total_cmp(y),
        (Some(Norm::Moment(x)), Some(Norm::Moment(y))) => x.cmp(y),
        (Some(Norm::Text(x)), Some(Norm::Text(y))) => x.cmp(y),
        (Some(x), Some(y)) => rank(x).cmp(&rank(y)),
    }
}

fn cmp_rows(a: &[Option<Norm>], b: &[Option<Norm>]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| cmp_norm(x, y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn values_equal(a: &Option<Norm>, b: &Option<Norm>, tolerance: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Norm::Int(x)), Some(Norm::Int(y))) => {
            (i128::from(*x) - i128::from(*y)).unsigned_abs() as f64 <= tolerance
        },
        (Some(Norm::Real(x)), Some(Norm::Real(y))) => (x - y).abs() <= tolerance,
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn show(value: &Option<Norm>) -> String {
    value
        .as_ref()
        .map_or_else(|| "null".to_string(), ToString::to_string)
}

/// Compare `old` (what is published) with `new` (what was just fetched)
pub fn compare(old: &Table, new: &Table, policy: &ComparePolicy) -> Comparison {
    let old_columns = participating(old, policy);
    let new_columns = participating(new, policy);
    let new_by_key: HashMap<&str, &Column> = new_columns
        .iter()
        .map(|(key, column)| (key.as_str(), *column))
        .collect();
    let old_keys: HashSet<&str> = old_columns.iter().map(|(key, _)| key.as_str()).collect();

    let added: Vec<String> = new_columns
        .iter()
        .filter(|(key, _)| !old_keys.contains(key.as_str()))
        .map(|(_, column)| column.name().to_string())
        .collect();
    let removed: Vec<String> = old_columns
        .iter()
        .filter(|(key, _)| !new_by_key.contains_key(key.as_str()))
        .map(|(_, column)| column.name().to_string())
        .collect();
    if !added.is_empty() || !removed.is_empty() {
        return Comparison::Columns { added, removed };
    }

    if old.len() != new.len() {
        return Comparison::RowCount {
            old: old.len(),
            new: new.len(),
        };
    }

    let rules = Rules::new(policy);
    let mut names = Vec::with_capacity(old_columns.len());
    let mut old_rows: Vec<Vec<Option<Norm>>> = vec![Vec::with_capacity(old_columns.len()); old.len()];
    let mut new_rows = old_rows.clone();

    for (key, old_column) in &old_columns {
        let Some(new_column) = new_by_key.get(key.as_str()) else {
            continue;
        };
        let coercion = rules.coercion(old_column, new_column);
        for (row, cell) in old_rows.iter_mut().zip(old_column.cells()) {
            row.push(rules.normalize(cell, coercion));
        }
        for (row, cell) in new_rows.iter_mut().zip(new_column.cells()) {
            row.push(rules.normalize(cell, coercion));
        }
        names.push(old_column.name());
    }

    if !policy.row_order_sensitive {
        old_rows.sort_by(|a, b| cmp_rows(a, b));
        new_rows.sort_by(|a, b| cmp_rows(a, b));
    }

    let mut changed_rows = 0;
    let mut samples = Vec::new();
    for (old_row, new_row) in old_rows.iter().zip(&new_rows) {
        let diffs: Vec<usize> = (0..names.len())
            .filter(|&c| !values_equal(&old_row[c], &new_row[c], policy.numeric_tolerance))
            .collect();
        if diffs.is_empty() {
            continue;
        }
        changed_rows += 1;
        if samples.len() < MAX_SAMPLES {
            samples.push(
                diffs
                    .iter()
                    .map(|&c| format!("{}: {} → {}", names[c], show(&old_row[c]), show(&new_row[c])))
                    .collect::<Vec<_>>()
                    .join("; "),
            );
        }
    }

    if changed_rows == 0 {
        Comparison::Equal
    } else {
        Comparison::Values {
            changed_rows,
            samples,
        }
    }
}

/// Shorthand for `compare(..).is_equal()`
pub fn equal(old: &Table, new: &Table, policy: &ComparePolicy) -> bool {
    compare(old, new, policy).is_equal()
}
