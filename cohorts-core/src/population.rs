//! Population data model.
//!
//! Rows arrive as column-name keyed records and are stored row-major against a
//! fixed column list. Every stage after loading works on row indices into the
//! [`Population`], so splits, samples and groups never copy record data until
//! the response is assembled.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Check if this cell is missing. NaN floats count as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Check if this cell is missing or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            other => other.is_null(),
        }
    }

    /// Numeric view of the cell, `None` for non-numeric or missing values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Check if the cell holds a number.
    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "nan"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            // Debug keeps the trailing ".0" on integral floats
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// One population member: column name to scalar value.
pub type Record = BTreeMap<String, Value>;

/// How a column is compared between a group and the reference population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Every present value is a number
    Numeric,
    /// Anything else (text, booleans, mixed)
    Categorical,
}

/// Row-major table with a fixed column order.
#[derive(Debug, Clone, Default)]
pub struct Population {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Population {
    /// Build a population from keyed records. Keys missing from a record load
    /// as [`Value::Null`]; keys not listed in `columns` are ignored.
    pub fn from_records(columns: Vec<String>, records: Vec<Record>) -> Self {
        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|name| record.remove(name).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    /// Classify a column over the given rows. A column is numeric when it has
    /// at least one present value and every present value is a number.
    pub fn column_kind(&self, column: usize, rows: &[usize]) -> ColumnKind {
        let mut seen = false;
        for &row in rows {
            let value = self.value(row, column);
            if value.is_null() {
                continue;
            }
            if !value.is_numeric() {
                return ColumnKind::Categorical;
            }
            seen = true;
        }
        if seen {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }

    /// Materialize one row as a keyed record.
    pub fn record(&self, row: usize) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[row].iter().cloned())
            .collect()
    }

    /// Materialize many rows, preserving the given order.
    pub fn records(&self, rows: &[usize]) -> Vec<Record> {
        rows.iter().map(|&row| self.record(row)).collect()
    }

    /// Rows that count toward the population: with an identifier column,
    /// blank identifiers are dropped and the first occurrence of each
    /// identifier wins. Returns the kept row indices in input order.
    pub fn included_rows(&self, identifier: Option<usize>) -> Vec<usize> {
        let Some(column) = identifier else {
            return (0..self.len()).collect();
        };

        let mut seen = HashSet::with_capacity(self.len());
        (0..self.len())
            .filter(|&row| {
                let value = self.value(row, column);
                if value.is_blank() {
                    return false;
                }
                seen.insert(value.to_string().trim().to_string())
            })
            .collect()
    }
}

/// Find an identifier column by naming convention: the first column whose
/// upper-cased name contains `IIN` (national ID, also `IIN_BIN`).
pub fn detect_identifier_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .find(|name| name.to_uppercase().contains("IIN"))
        .map(String::as_str)
}
