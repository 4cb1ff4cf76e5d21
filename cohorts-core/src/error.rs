//! Error types for cohorts-core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage at which a stratification run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request validation, before anything executes
    Validation,
    /// Identifier de-duplication and stratum construction
    Preparation,
    /// Sub-sampling of oversized populations
    Sampling,
    /// Group splitting and balance validation
    Splitting,
    /// Projection of sample proportions onto the full population
    Extrapolation,
}

impl Stage {
    /// Stable string form used in logs and reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Preparation => "preparation",
            Self::Sampling => "sampling",
            Self::Splitting => "splitting",
            Self::Extrapolation => "extrapolation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for stratification runs
#[derive(Debug, Error)]
pub enum StratifyError {
    /// Malformed request: missing fields, contradictory options, bad proportions
    #[error("[validation] invalid request: {0}")]
    Config(String),

    /// A column named in the request does not exist in the population
    #[error("[validation] {role} column '{column}' not found in the population")]
    UnknownColumn { column: String, role: &'static str },

    /// The request carried no rows (or every row was excluded)
    #[error("[preparation] population is empty after excluding blank and duplicate identifiers")]
    EmptyPopulation,

    /// Fewer than two strata survived the undersized-stratum filter
    #[error(
        "[preparation] not enough unique strata after removing insufficient ones: {remaining} remaining, {dropped} dropped"
    )]
    InsufficientStrata { remaining: usize, dropped: usize },
}

impl StratifyError {
    /// Stage at which the error was raised.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::UnknownColumn { .. } => Stage::Validation,
            Self::EmptyPopulation | Self::InsufficientStrata { .. } => Stage::Preparation,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for stratification operations
pub type Result<T> = std::result::Result<T, StratifyError>;
