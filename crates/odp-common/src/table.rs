//! In-memory tabular model
//!
//! A [`Table`] is an ordered list of named [`Column`]s of equal length. Each
//! column carries a [`ColumnKind`] inferred from the cells it holds; the kind
//! is advisory (comparison does its own coercion) but lets extractors and the
//! artifact writer reason about a column without rescanning it.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

use crate::error::{OdpError, Result};

/// Canonical timestamp layout used on disk and in comparisons
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical date layout
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Str(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Cell {
    /// True for explicit nulls and NaN reals
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Real(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text written to an artifact for this cell. Nulls become the empty string.
    pub fn to_canonical(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Int(v) => v.to_string(),
            Cell::Real(v) if !v.is_finite() => String::new(),
            Cell::Real(v) => v.to_string(),
            Cell::Str(s) => s.clone(),
            Cell::Date(d) => d.format(DATE_FORMAT).to_string(),
            Cell::Timestamp(t) => t.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    fn kind(&self) -> Option<ColumnKind> {
        match self {
            _ if self.is_null() => None,
            Cell::Int(_) => Some(ColumnKind::Int),
            Cell::Real(_) => Some(ColumnKind::Real),
            Cell::Date(_) => Some(ColumnKind::Date),
            Cell::Timestamp(_) => Some(ColumnKind::Timestamp),
            _ => Some(ColumnKind::Str),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(i64::from(v))
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Real(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Str(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Str(v)
    }
}

impl From<NaiveDate> for Cell {
    fn from(v: NaiveDate) -> Self {
        Cell::Date(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(v: NaiveDateTime) -> Self {
        Cell::Timestamp(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Real,
    Date,
    Timestamp,
    /// Text, or a column whose cells disagree on type
    Str,
}

fn merge_kind(current: Option<ColumnKind>, cell: &Cell) -> Option<ColumnKind> {
    use ColumnKind::*;
    let Some(next) = cell.kind() else {
        return current;
    };
    Some(match (current, next) {
        (None, k) => k,
        (Some(a), b) if a == b => a,
        (Some(Int), Real) | (Some(Real), Int) => Real,
        (Some(Date), Timestamp) | (Some(Timestamp), Date) => Timestamp,
        _ => Str,
    })
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    cells: Vec<Cell>,
    kind: Option<ColumnKind>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        let kind = cells.iter().fold(None, merge_kind);
        Self {
            name: name.into(),
            cells,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, row: usize) -> Option<&Cell> {
        self.cells.get(row)
    }

    /// Inferred kind; an all-null column reports [`ColumnKind::Str`]
    pub fn kind(&self) -> ColumnKind {
        self.kind.unwrap_or(ColumnKind::Str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn push(&mut self, cell: Cell) {
        self.kind = merge_kind(self.kind, &cell);
        self.cells.push(cell);
    }
}

/// An ordered set of equally long columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table from a header row and data rows.
    ///
    /// Every row must have exactly one cell per header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let mut table = Self::empty(headers);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// A table with the given headers and no rows
    pub fn empty(headers: Vec<String>) -> Self {
        Self {
            columns: headers
                .into_iter()
                .map(|name| Column::new(name, Vec::new()))
                .collect(),
            rows: 0,
        }
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
            return Err(OdpError::table(format!(
                "column '{}' has {} cells, expected {}",
                bad.name(),
                bad.len(),
                rows
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(OdpError::table(format!(
                "row {} has {} cells, expected {}",
                self.rows,
                row.len(),
                self.columns.len()
            )));
        }
        for (column, cell) in self.columns.iter_mut().zip(row) {
            column.push(cell);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.rows {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.cells[index]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.rows).map(move |i| self.columns.iter().map(|c| &c.cells[i]).collect())
    }

    /// Keep only the named columns, in the order given
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| missing_column(name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns,
            rows: self.rows,
        })
    }

    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| missing_column(from))?;
        column.name = to.into();
        Ok(())
    }

    /// Append a column, replacing any existing column of the same name
    pub fn with_column(mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<Table> {
        let column = Column::new(name, cells);
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(OdpError::table(format!(
                "column '{}' has {} cells, expected {}",
                column.name,
                column.len(),
                self.rows
            )));
        }
        self.rows = column.len();
        match self.column_index(column.name()) {
            Some(index) => self.columns[index] = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Rewrite every cell of one column
    pub fn map_column(&mut self, name: &str, f: impl FnMut(&Cell) -> Cell) -> Result<()> {
        let index = self.column_index(name).ok_or_else(|| missing_column(name))?;
        let cells = self.columns[index].cells.iter().map(f).collect();
        self.columns[index] = Column::new(name, cells);
        Ok(())
    }

    /// Rows for which `keep` returns true, in their original order
    pub fn filter_rows(&self, mut keep: impl FnMut(&[&Cell]) -> bool) -> Table {
        let mut out = Table::empty(self.headers().into_iter().map(String::from).collect());
        for row in self.rows() {
            if keep(&row) {
                for (column, cell) in out.columns.iter_mut().zip(row) {
                    column.push(cell.clone());
                }
                out.rows += 1;
            }
        }
        out
    }
}

fn missing_column(name: &str) -> OdpError {
    OdpError::table(format!("column '{name}' not found"))
}
