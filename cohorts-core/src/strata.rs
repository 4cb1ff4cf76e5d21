//! Stratum construction.
//!
//! A stratum key is the `_`-joined string form of a record's stratification
//! columns. Keys exist only for splitting; they are never written back to the
//! records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::population::{ColumnKind, Population};

/// A stratum removed because it had too few members to spread across groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedStratum {
    pub key: String,
    pub count: usize,
}

/// One stratum and its member rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratum {
    pub key: String,
    pub rows: Vec<usize>,
}

/// Rows grouped by stratum key, ordered by key so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrataIndex {
    strata: Vec<Stratum>,
}

/// How stratum keys are derived from stratification columns.
#[derive(Debug, Clone)]
pub struct KeySpec {
    columns: Vec<(usize, ColumnKind)>,
    replace_nan: bool,
}

impl KeySpec {
    /// `columns` are population column indices. Column kinds are taken over
    /// `rows` so missing-value replacement matches the column's type.
    pub fn new(population: &Population, columns: &[usize], rows: &[usize], replace_nan: bool) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|&c| (c, population.column_kind(c, rows)))
                .collect(),
            replace_nan,
        }
    }

    /// Stratum key for one row.
    pub fn key(&self, population: &Population, row: usize) -> String {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|&(column, kind)| {
                let value = population.value(row, column);
                if value.is_null() {
                    match (self.replace_nan, kind) {
                        (true, ColumnKind::Numeric) => "0".to_string(),
                        (true, ColumnKind::Categorical) => "None".to_string(),
                        (false, _) => "nan".to_string(),
                    }
                } else if kind == ColumnKind::Numeric {
                    value.as_f64().map_or_else(|| value.to_string(), numeric_key)
                } else {
                    value.to_string()
                }
            })
            .collect();
        parts.join("_")
    }
}

/// Key text for a number in a numeric column. Integral values render without
/// a fraction so `1` and `1.0` share a stratum.
fn numeric_key(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:?}")
    }
}

impl StrataIndex {
    /// Group `rows` by stratum key.
    pub fn build(population: &Population, rows: &[usize], spec: &KeySpec) -> Self {
        let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for &row in rows {
            by_key.entry(spec.key(population, row)).or_default().push(row);
        }
        Self::from_map(by_key)
    }

    fn from_map(by_key: BTreeMap<String, Vec<usize>>) -> Self {
        Self {
            strata: by_key
                .into_iter()
                .map(|(key, rows)| Stratum { key, rows })
                .collect(),
        }
    }

    /// Build an index directly from `(key, rows)` pairs. Pairs sharing a key
    /// are merged.
    pub fn from_parts(parts: impl IntoIterator<Item = (String, Vec<usize>)>) -> Self {
        let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (key, rows) in parts {
            by_key.entry(key).or_default().extend(rows);
        }
        Self::from_map(by_key)
    }

    /// Remove strata with fewer than `min_members` rows. Removal is a
    /// data-quality signal, so every dropped stratum is logged and returned.
    pub fn drop_undersized(&mut self, min_members: usize) -> Vec<DroppedStratum> {
        let mut dropped = Vec::new();
        self.strata.retain(|stratum| {
            if stratum.rows.len() < min_members {
                dropped.push(DroppedStratum {
                    key: stratum.key.clone(),
                    count: stratum.rows.len(),
                });
                false
            } else {
                true
            }
        });

        if !dropped.is_empty() {
            let rows: usize = dropped.iter().map(|d| d.count).sum();
            warn!(
                strata = dropped.len(),
                rows,
                min_members,
                keys = ?dropped.iter().map(|d| d.key.as_str()).collect::<Vec<_>>(),
                "dropped strata with insufficient members"
            );
        }
        dropped
    }

    /// Number of distinct strata.
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Total member rows across all strata.
    pub fn total_rows(&self) -> usize {
        self.strata.iter().map(|s| s.rows.len()).sum()
    }

    /// All member rows, ascending.
    pub fn rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.strata.iter().flat_map(|s| s.rows.iter().copied()).collect();
        rows.sort_unstable();
        rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stratum> {
        self.strata.iter()
    }

    /// Member rows of the stratum with `key`, if present.
    pub fn get(&self, key: &str) -> Option<&[usize]> {
        self.strata
            .binary_search_by(|s| s.key.as_str().cmp(key))
            .ok()
            .map(|i| self.strata[i].rows.as_slice())
    }

    /// Keep only the given rows, dropping strata that become empty.
    pub fn restrict(&self, keep: &[usize]) -> Self {
        let keep: std::collections::HashSet<usize> = keep.iter().copied().collect();
        Self::from_parts(self.strata.iter().filter_map(|s| {
            let rows: Vec<usize> = s.rows.iter().copied().filter(|r| keep.contains(r)).collect();
            (!rows.is_empty()).then(|| (s.key.clone(), rows))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{Record, Value};

    fn population(rows: &[(&str, Value)]) -> Population {
        let records: Vec<Record> = rows
            .iter()
            .map(|(gender, region)| {
                [
                    ("gender".to_string(), Value::from(*gender)),
                    ("region".to_string(), region.clone()),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        Population::from_records(vec!["gender".into(), "region".into()], records)
    }

    #[test]
    fn test_keys_join_columns_with_underscore() {
        let pop = population(&[("M", Value::Int(1)), ("F", Value::Int(2))]);
        let rows = [0, 1];
        let spec = KeySpec::new(&pop, &[0, 1], &rows, true);
        assert_eq!(spec.key(&pop, 0), "M_1");
        assert_eq!(spec.key(&pop, 1), "F_2");
    }

    #[test]
    fn test_integral_floats_share_a_stratum_with_ints() {
        let pop = population(&[
            ("M", Value::Int(1)),
            ("M", Value::Float(1.0)),
            ("M", Value::Float(2.5)),
        ]);
        let rows = [0, 1, 2];
        let spec = KeySpec::new(&pop, &[1], &rows, true);
        assert_eq!(spec.key(&pop, 0), "1");
        assert_eq!(spec.key(&pop, 1), "1");
        assert_eq!(spec.key(&pop, 2), "2.5");

        let index = StrataIndex::build(&pop, &rows, &spec);
        assert_eq!(index.get("1"), Some(&[0, 1][..]));
    }

    #[test]
    fn test_missing_values_follow_replace_nan() {
        let pop = population(&[("M", Value::Int(1)), ("F", Value::Null)]);
        let rows = [0, 1];

        let replaced = KeySpec::new(&pop, &[1], &rows, true);
        assert_eq!(replaced.key(&pop, 1), "0");

        let kept = KeySpec::new(&pop, &[1], &rows, false);
        assert_eq!(kept.key(&pop, 1), "nan");
    }

    #[test]
    fn test_build_orders_strata_by_key() {
        let pop = population(&[
            ("M", Value::Int(1)),
            ("F", Value::Int(1)),
            ("M", Value::Int(1)),
        ]);
        let rows = [0, 1, 2];
        let index = StrataIndex::build(&pop, &rows, &KeySpec::new(&pop, &[0], &rows, true));
        let keys: Vec<&str> = index.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["F", "M"]);
        assert_eq!(index.get("M"), Some(&[0, 2][..]));
        assert_eq!(index.total_rows(), 3);
    }

    #[test]
    fn test_drop_undersized_reports_removed_strata() {
        let mut index = StrataIndex::from_parts([
            ("a".to_string(), vec![0, 1, 2]),
            ("b".to_string(), vec![3]),
            ("c".to_string(), vec![4, 5]),
        ]);
        let dropped = index.drop_undersized(3);
        assert_eq!(
            dropped,
            vec![
                DroppedStratum { key: "b".into(), count: 1 },
                DroppedStratum { key: "c".into(), count: 2 },
            ]
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.rows(), vec![0, 1, 2]);
    }

    #[test]
    fn test_restrict_keeps_only_listed_rows() {
        let index = StrataIndex::from_parts([
            ("a".to_string(), vec![0, 1, 2]),
            ("b".to_string(), vec![3, 4]),
        ]);
        let restricted = index.restrict(&[1, 3, 4]);
        assert_eq!(restricted.get("a"), Some(&[1][..]));
        assert_eq!(restricted.get("b"), Some(&[3, 4][..]));

        let only_b = index.restrict(&[4]);
        assert_eq!(only_b.len(), 1);
    }
}
