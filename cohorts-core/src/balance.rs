//! Balance testing between a group and its reference population.
//!
//! | Column kind | Test | Statistic |
//! |-------------|------|-----------|
//! | Numeric | two-sample Kolmogorov-Smirnov | max distance between empirical CDFs |
//! | Categorical | chi-square on a 2×M contingency table | Pearson χ² (Yates-corrected at 1 dof) |
//!
//! Degenerate comparisons (constant columns, a single category, no values at
//! all) report `p_value = 1.0`. Numerical failures never propagate: they are
//! reported as `p_value = 0.0` with [`TestKind::Error`] so callers treat the
//! group as not yet balanced.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;
use tracing::debug;

use crate::population::{ColumnKind, Population};

/// Which test produced a [`BalanceResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Kolmogorov-Smirnov two-sample test
    Ks,
    /// Chi-square independence test
    Chi2,
    /// The test could not be computed
    Error,
}

/// Similarity of one column between a group and the reference population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub column: String,
    pub statistic: f64,
    /// In `[0, 1]`; higher means more similar
    pub p_value: f64,
    pub test_kind: TestKind,
}

impl BalanceResult {
    fn error(column: &str) -> Self {
        Self {
            column: column.to_string(),
            statistic: f64::INFINITY,
            p_value: 0.0,
            test_kind: TestKind::Error,
        }
    }
}

/// Internal failure of a statistical test. Never leaves this module.
#[derive(Debug, Error)]
enum StatTestError {
    #[error("one side of the comparison has no values")]
    EmptySample,

    #[error("non-finite {0}")]
    NonFinite(&'static str),

    #[error("invalid distribution: {0}")]
    Distribution(String),
}

/// Reference distribution of one column, computed once per population.
#[derive(Debug, Clone)]
enum Reference {
    Numeric { sorted: Vec<f64> },
    Categorical { counts: BTreeMap<String, u64> },
}

#[derive(Debug, Clone)]
struct MonitoredColumn {
    name: String,
    index: usize,
    reference: Reference,
}

/// Compares groups against a fixed reference population, column by column.
#[derive(Debug, Clone)]
pub struct BalanceTester {
    columns: Vec<MonitoredColumn>,
}

impl BalanceTester {
    /// Prepare reference distributions for `columns` over `reference_rows`.
    /// Column names not present in the population are skipped.
    pub fn new(population: &Population, reference_rows: &[usize], columns: &[String]) -> Self {
        let columns = columns
            .iter()
            .filter_map(|name| {
                let index = population.column_index(name)?;
                let reference = match population.column_kind(index, reference_rows) {
                    ColumnKind::Numeric => Reference::Numeric {
                        sorted: sorted_numbers(population, index, reference_rows),
                    },
                    ColumnKind::Categorical => Reference::Categorical {
                        counts: category_counts(population, index, reference_rows),
                    },
                };
                Some(MonitoredColumn {
                    name: name.clone(),
                    index,
                    reference,
                })
            })
            .collect();
        Self { columns }
    }

    /// Names of the monitored columns, in request order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Test one group (given as population rows) on every monitored column.
    pub fn test(&self, population: &Population, rows: &[usize]) -> Vec<BalanceResult> {
        self.columns
            .iter()
            .map(|column| {
                let outcome = match &column.reference {
                    Reference::Numeric { sorted } => {
                        let subset = sorted_numbers(population, column.index, rows);
                        ks_two_sample(sorted, &subset).map(|(d, p)| (d, p, TestKind::Ks))
                    }
                    Reference::Categorical { counts } => {
                        let subset = category_counts(population, column.index, rows);
                        chi2_contingency(counts, &subset).map(|(s, p)| (s, p, TestKind::Chi2))
                    }
                };
                match outcome {
                    Ok((statistic, p_value, test_kind)) => BalanceResult {
                        column: column.name.clone(),
                        statistic,
                        p_value: p_value.clamp(0.0, 1.0),
                        test_kind,
                    },
                    Err(e) => {
                        debug!(column = %column.name, error = %e, "balance test failed");
                        BalanceResult::error(&column.name)
                    }
                }
            })
            .collect()
    }
}

fn sorted_numbers(population: &Population, column: usize, rows: &[usize]) -> Vec<f64> {
    let mut values: Vec<f64> = rows
        .iter()
        .filter_map(|&row| population.value(row, column).as_f64())
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

fn category_counts(population: &Population, column: usize, rows: &[usize]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for &row in rows {
        let value = population.value(row, column);
        if !value.is_null() {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Two-sample KS statistic and asymptotic p-value over sorted samples.
fn ks_two_sample(reference: &[f64], subset: &[f64]) -> Result<(f64, f64), StatTestError> {
    if reference.is_empty() && subset.is_empty() {
        return Ok((0.0, 1.0));
    }
    if reference.is_empty() || subset.is_empty() {
        return Err(StatTestError::EmptySample);
    }

    let n = reference.len();
    let m = subset.len();
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let x = reference[i].min(subset[j]);
        while i < n && reference[i] <= x {
            i += 1;
        }
        while j < m && subset[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n as f64 - j as f64 / m as f64).abs());
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    let p = kolmogorov_survival(lambda);
    if !p.is_finite() {
        return Err(StatTestError::NonFinite("ks p-value"));
    }
    Ok((d, p))
}

/// Survival function of the Kolmogorov distribution, `P(K > lambda)`.
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < 1.18 {
        let y = (-PI * PI / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * PI).sqrt() / lambda * (y + y.powi(9) + y.powi(25) + y.powi(49));
        (1.0 - cdf).clamp(0.0, 1.0)
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        (2.0 * (x - x.powi(4) + x.powi(9))).clamp(0.0, 1.0)
    }
}

/// Chi-square test on the 2×M table of reference vs subset category counts.
fn chi2_contingency(
    reference: &BTreeMap<String, u64>,
    subset: &BTreeMap<String, u64>,
) -> Result<(f64, f64), StatTestError> {
    let mut categories: Vec<&str> = reference.keys().map(String::as_str).collect();
    for key in subset.keys() {
        if !reference.contains_key(key) {
            categories.push(key);
        }
    }

    let rows = [reference, subset];
    let table: Vec<[f64; 2]> = categories
        .iter()
        .map(|cat| {
            let count = |side: &BTreeMap<String, u64>| side.get(*cat).copied().unwrap_or(0) as f64;
            [count(rows[0]), count(rows[1])]
        })
        .collect();

    let nonzero = table.iter().filter(|c| c[0] + c[1] > 0.0).count();
    let total: f64 = table.iter().map(|c| c[0] + c[1]).sum();
    if total == 0.0 || nonzero <= 1 {
        return Ok((0.0, 1.0));
    }

    let row_totals = [
        table.iter().map(|c| c[0]).sum::<f64>(),
        table.iter().map(|c| c[1]).sum::<f64>(),
    ];
    if row_totals.iter().any(|&t| t == 0.0) {
        return Err(StatTestError::EmptySample);
    }

    let dof = categories.len() - 1;
    let mut statistic = 0.0;
    for cell in &table {
        let col_total = cell[0] + cell[1];
        for side in 0..2 {
            let expected = row_totals[side] * col_total / total;
            let mut diff = (cell[side] - expected).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            statistic += diff * diff / expected;
        }
    }
    if !statistic.is_finite() {
        return Err(StatTestError::NonFinite("chi-square statistic"));
    }

    let distribution =
        ChiSquared::new(dof as f64).map_err(|e| StatTestError::Distribution(e.to_string()))?;
    Ok((statistic, distribution.sf(statistic)))
}
