//! cohorts-core - stratified cohort splitting with balance validation
//!
//! Splits a population into one control and several target groups so that
//! every group mirrors the population on a set of stratification columns,
//! then checks each group against the population with KS (numeric) or
//! chi-square (categorical) tests.
//!
//! # Pipeline
//!
//! 1. [`StratificationRequest::split_mode`] validates the request
//! 2. Rows with blank or duplicate identifiers are excluded
//! 3. Rows are grouped into strata; strata too small to spread are dropped
//! 4. The pool is split ([`split`]) and, when a threshold is given, re-split
//!    with new seeds until balanced ([`validator::optimize`])
//! 5. Populations above `max_memory_rows` are split on a sample and the
//!    per-stratum proportions are extrapolated to every row
//!
//! The whole pipeline is synchronous and holds no state between calls.

pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod extrapolate;
pub mod group;
pub mod population;
pub mod request;
pub mod sampling;
pub mod split;
pub mod strata;
pub mod validator;

pub use balance::{BalanceResult, BalanceTester, TestKind};
pub use config::EngineConfig;
pub use engine::StratificationEngine;
pub use error::{Result, Stage, StratifyError};
pub use group::GroupKind;
pub use population::{ColumnKind, Population, Record, Value, detect_identifier_column};
pub use request::{
    GroupResult, HeldOutSet, MemoryInfo, StratificationRequest, StratificationResponse,
};
pub use split::{SplitMethod, SplitMode, split};
pub use strata::{DroppedStratum, StrataIndex};
pub use validator::IterationInfo;
