//! Typed stratification request and response payloads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::balance::BalanceResult;
use crate::error::{Result, StratifyError};
use crate::group::GroupKind;
use crate::population::Record;
use crate::split::{SplitMethod, SplitMode};
use crate::strata::DroppedStratum;
use crate::validator::IterationInfo;

/// Largest number of groups a request may ask for.
pub const MAX_GROUPS: usize = 10;

const PROPORTION_TOLERANCE: f64 = 1e-6;

/// A population plus the options for splitting it.
///
/// Optional tuning fields left as `None` fall back to the engine's
/// [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StratificationRequest {
    #[serde(alias = "data")]
    pub rows: Vec<Record>,
    /// Column order for the population. Empty means every key seen in `rows`.
    pub columns: Vec<String>,
    pub n_splits: Option<usize>,
    pub split_sizes: Option<Vec<f64>>,
    #[serde(alias = "stratify_cols")]
    pub stratify_columns: Vec<String>,
    /// Columns checked for balance. `None` means every numeric column except
    /// the identifier.
    #[serde(alias = "ks_test_columns")]
    pub monitored_columns: Option<Vec<String>>,
    pub min_p_value: Option<f64>,
    pub max_iterations: Option<u32>,
    pub max_memory_rows: Option<usize>,
    pub sample_size: Option<usize>,
    pub use_sampling: bool,
    #[serde(alias = "random_state")]
    pub random_seed: Option<u64>,
    /// Fraction of the pool held out before splitting
    pub test_size: Option<f64>,
    pub replace_nan: bool,
    pub identifier_column: Option<String>,
}

impl Default for StratificationRequest {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            columns: Vec::new(),
            n_splits: None,
            split_sizes: None,
            stratify_columns: Vec::new(),
            monitored_columns: None,
            min_p_value: None,
            max_iterations: None,
            max_memory_rows: None,
            sample_size: None,
            use_sampling: true,
            random_seed: None,
            test_size: None,
            replace_nan: true,
            identifier_column: None,
        }
    }
}

impl StratificationRequest {
    /// Create a request for `rows` stratified on `stratify_columns`.
    pub fn new(rows: Vec<Record>, stratify_columns: Vec<String>) -> Self {
        Self {
            rows,
            stratify_columns,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = Some(n_splits);
        self
    }

    #[must_use]
    pub fn with_split_sizes(mut self, sizes: Vec<f64>) -> Self {
        self.split_sizes = Some(sizes);
        self
    }

    #[must_use]
    pub fn with_monitored_columns(mut self, columns: Vec<String>) -> Self {
        self.monitored_columns = Some(columns);
        self
    }

    #[must_use]
    pub fn with_min_p_value(mut self, min_p_value: f64) -> Self {
        self.min_p_value = Some(min_p_value);
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    #[must_use]
    pub fn with_max_memory_rows(mut self, rows: usize) -> Self {
        self.max_memory_rows = Some(rows);
        self
    }

    #[must_use]
    pub fn with_sample_size(mut self, rows: usize) -> Self {
        self.sample_size = Some(rows);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = Some(test_size);
        self
    }

    #[must_use]
    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = Some(column.into());
        self
    }

    /// Population column order: the explicit list, or every record key.
    pub fn resolved_columns(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        let keys: BTreeSet<&String> = self.rows.iter().flat_map(|r| r.keys()).collect();
        keys.into_iter().cloned().collect()
    }

    /// Check option consistency and return the split mode. Column existence
    /// is checked separately against the loaded population.
    pub fn split_mode(&self) -> Result<SplitMode> {
        let mode = match (&self.n_splits, &self.split_sizes) {
            (Some(_), Some(_)) => {
                return Err(StratifyError::config(
                    "provide either n_splits or split_sizes, not both",
                ));
            }
            (None, None) => {
                return Err(StratifyError::config("one of n_splits or split_sizes is required"));
            }
            (Some(k), None) => {
                if !(2..=MAX_GROUPS).contains(k) {
                    return Err(StratifyError::config(format!(
                        "n_splits must be between 2 and {MAX_GROUPS}, got {k}"
                    )));
                }
                SplitMode::EqualFolds(*k)
            }
            (None, Some(sizes)) => {
                if !(2..=MAX_GROUPS).contains(&sizes.len()) {
                    return Err(StratifyError::config(format!(
                        "split_sizes must have between 2 and {MAX_GROUPS} entries, got {}",
                        sizes.len()
                    )));
                }
                if let Some(bad) = sizes.iter().find(|&&p| !(p > 0.0 && p < 1.0)) {
                    return Err(StratifyError::config(format!(
                        "split_sizes entries must be in (0, 1), got {bad}"
                    )));
                }
                let sum: f64 = sizes.iter().sum();
                if (sum - 1.0).abs() > PROPORTION_TOLERANCE {
                    return Err(StratifyError::config(format!(
                        "split_sizes must sum to 1.0, got {sum}"
                    )));
                }
                SplitMode::Proportions(sizes.clone())
            }
        };

        if self.stratify_columns.is_empty() {
            return Err(StratifyError::config("stratify_columns must not be empty"));
        }
        if let Some(p) = self.min_p_value {
            if !(0.0..=1.0).contains(&p) {
                return Err(StratifyError::config(format!(
                    "min_p_value must be in [0, 1], got {p}"
                )));
            }
        }
        if self.max_iterations == Some(0) {
            return Err(StratifyError::config("max_iterations must be at least 1"));
        }
        if self.max_memory_rows == Some(0) || self.sample_size == Some(0) {
            return Err(StratifyError::config(
                "max_memory_rows and sample_size must be positive",
            ));
        }
        if let Some(t) = self.test_size {
            if !(t > 0.0 && t < 1.0) {
                return Err(StratifyError::config(format!(
                    "test_size must be in (0, 1), got {t}"
                )));
            }
        }
        Ok(mode)
    }

    /// True when the balance validator should iterate: both a threshold and
    /// an explicit monitored-column list were given.
    pub fn validator_enabled(&self) -> bool {
        self.min_p_value.is_some()
            && self
                .monitored_columns
                .as_ref()
                .is_some_and(|c| !c.is_empty())
    }
}

/// One output group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    /// 1-based position; ordinal 1 is the control group
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub row_count: usize,
    /// Actual share of `total_rows`, rounded to 4 decimals
    pub proportion: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_proportion: Option<f64>,
    pub data: Vec<Record>,
    pub balance: Vec<BalanceResult>,
}

/// Rows set aside by `test_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldOutSet {
    pub row_count: usize,
    pub requested_proportion: f64,
    pub data: Vec<Record>,
    pub balance: Vec<BalanceResult>,
}

/// How the population was processed with respect to memory limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// True when groups were extrapolated from a sample; proportions are
    /// then approximate
    pub memory_efficient_processing: bool,
    pub max_memory_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rows: Option<usize>,
    /// Rows left out by extrapolation rounding
    pub unassigned_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_sample_cap: Option<usize>,
}

/// Result of a stratification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratificationResponse {
    pub n_splits: usize,
    pub split_method: SplitMethod,
    pub stratify_columns: Vec<String>,
    pub monitored_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_column: Option<String>,
    pub groups: Vec<GroupResult>,
    /// Rows in the split pool: after exclusions, dropped strata and hold-out
    pub total_rows: usize,
    /// Records excluded for a blank or duplicate identifier
    pub excluded_records: usize,
    pub dropped_strata: Vec<DroppedStratum>,
    pub memory_info: MemoryInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_info: Option<IterationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_set: Option<HeldOutSet>,
}

impl StratificationResponse {
    /// Sum of group row counts.
    pub fn assigned_rows(&self) -> usize {
        self.groups.iter().map(|g| g.row_count).sum()
    }
}
