//! Stratification pipeline.
//!
//! ```text
//! validate → load → exclude blank/duplicate ids → build strata → drop undersized
//!          → [hold out test set] → [sample if oversized] → split (+ iterate)
//!          → [extrapolate to full pool] → assemble groups
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, instrument};

use crate::balance::{BalanceResult, BalanceTester};
use crate::config::EngineConfig;
use crate::error::{Result, StratifyError};
use crate::extrapolate::{StratumProportions, extrapolate};
use crate::group::GroupKind;
use crate::population::{ColumnKind, Population, detect_identifier_column};
use crate::request::{
    GroupResult, HeldOutSet, MemoryInfo, StratificationRequest, StratificationResponse,
};
use crate::sampling::PopulationSampler;
use crate::split::{SplitMode, hold_out, split};
use crate::strata::{KeySpec, StrataIndex};
use crate::validator::{Candidate, IterationInfo, IterationPolicy, optimize};

/// Runs stratification requests against a fixed [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct StratificationEngine {
    config: EngineConfig,
}

/// Groups before they are materialized into records.
struct Assignment {
    groups: Vec<Vec<usize>>,
    balance: Vec<Vec<BalanceResult>>,
    iteration_info: Option<IterationInfo>,
    memory_info: MemoryInfo,
}

impl StratificationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Split the request's population into balanced groups.
    #[instrument(skip_all, fields(rows = request.rows.len()))]
    pub fn run(&self, mut request: StratificationRequest) -> Result<StratificationResponse> {
        let mode = request.split_mode()?;
        let seed = request.random_seed.unwrap_or(self.config.random_seed);

        let columns = request.resolved_columns();
        let population = Population::from_records(columns, std::mem::take(&mut request.rows));
        let stratify_idx = resolve_columns(&population, &request.stratify_columns, "stratify")?;
        if let Some(monitored) = &request.monitored_columns {
            resolve_columns(&population, monitored, "monitored")?;
        }
        let identifier = match &request.identifier_column {
            Some(name) => Some(resolve_columns(&population, std::slice::from_ref(name), "identifier")?[0]),
            None => detect_identifier_column(population.columns())
                .and_then(|name| population.column_index(name)),
        };
        let identifier_name = identifier.map(|i| population.columns()[i].clone());

        let included = population.included_rows(identifier);
        let excluded_records = population.len() - included.len();
        if included.is_empty() {
            return Err(StratifyError::EmptyPopulation);
        }
        if excluded_records > 0 {
            info!(excluded_records, "excluded blank or duplicate identifiers");
        }

        let key_spec = KeySpec::new(&population, &stratify_idx, &included, request.replace_nan);
        let mut strata = StrataIndex::build(&population, &included, &key_spec);
        let min_members = mode.group_count() + usize::from(request.test_size.is_some());
        let dropped_strata = strata.drop_undersized(min_members);
        if strata.len() < 2 {
            return Err(StratifyError::InsufficientStrata {
                remaining: strata.len(),
                dropped: dropped_strata.len(),
            });
        }

        let monitored_columns = match &request.monitored_columns {
            Some(columns) => columns.clone(),
            None => default_monitored(&population, &included, identifier),
        };

        let test_set = match request.test_size {
            Some(fraction) => {
                let reference = strata.rows();
                let (held, rest) = hold_out(&strata, fraction, seed);
                let tester = BalanceTester::new(&population, &reference, &monitored_columns);
                info!(held_out = held.len(), fraction, "held out test set");
                strata = rest;
                if strata.len() < 2 || strata.total_rows() < mode.group_count() {
                    return Err(StratifyError::InsufficientStrata {
                        remaining: strata.len(),
                        dropped: dropped_strata.len(),
                    });
                }
                Some(HeldOutSet {
                    row_count: held.len(),
                    requested_proportion: fraction,
                    balance: tester.test(&population, &held),
                    data: population.records(&held),
                })
            }
            None => None,
        };

        let policy = IterationPolicy {
            base_seed: seed,
            stride: self.config.seed_stride,
            max_iterations: request.max_iterations.unwrap_or(self.config.max_iterations),
            min_p_value: request.min_p_value.filter(|_| request.validator_enabled()),
        };
        if request.min_p_value.is_some() && policy.min_p_value.is_none() {
            debug!("min_p_value ignored without explicit monitored_columns");
        }

        let max_memory_rows = request.max_memory_rows.unwrap_or(self.config.max_memory_rows);
        let total_rows = strata.total_rows();
        let assignment = if request.use_sampling && total_rows > max_memory_rows {
            self.split_sampled(
                &request,
                &population,
                &strata,
                &mode,
                &policy,
                &monitored_columns,
                min_members,
                max_memory_rows,
            )
        } else {
            split_in_memory(&population, &strata, &mode, &policy, &monitored_columns, max_memory_rows)
        };

        let requested = mode.requested_proportions();
        let groups = assignment
            .groups
            .iter()
            .zip(assignment.balance)
            .enumerate()
            .map(|(i, (rows, balance))| {
                let ordinal = (i + 1) as u32;
                GroupResult {
                    ordinal,
                    kind: GroupKind::for_ordinal(ordinal),
                    row_count: rows.len(),
                    proportion: round4(rows.len() as f64 / total_rows as f64),
                    requested_proportion: matches!(mode, SplitMode::Proportions(_))
                        .then_some(requested[i]),
                    data: population.records(rows),
                    balance,
                }
            })
            .collect();

        let response = StratificationResponse {
            n_splits: mode.group_count(),
            split_method: mode.method(),
            stratify_columns: request.stratify_columns.clone(),
            monitored_columns,
            identifier_column: identifier_name,
            groups,
            total_rows,
            excluded_records,
            dropped_strata,
            memory_info: assignment.memory_info,
            iteration_info: assignment.iteration_info,
            test_set,
        };
        info!(
            groups = response.groups.len(),
            total_rows,
            assigned = response.assigned_rows(),
            strata = strata.len(),
            extrapolated = response.memory_info.memory_efficient_processing,
            "stratification complete"
        );
        Ok(response)
    }

    /// Split a stratified sample, then project its per-stratum proportions
    /// onto the full pool.
    #[allow(clippy::too_many_arguments)]
    fn split_sampled(
        &self,
        request: &StratificationRequest,
        population: &Population,
        strata: &StrataIndex,
        mode: &SplitMode,
        policy: &IterationPolicy,
        monitored: &[String],
        min_members: usize,
        max_memory_rows: usize,
    ) -> Assignment {
        let sample_size = request.sample_size.unwrap_or(self.config.sample_size);
        let mut sampler =
            PopulationSampler::with_seed(sample_size, self.config.min_sample_per_stratum, policy.base_seed);
        let sample = sampler.sample(strata, min_members);
        info!(
            population = strata.total_rows(),
            sample = sample.total_rows(),
            max_memory_rows,
            "population above memory threshold, splitting a sample"
        );

        let tester = BalanceTester::new(population, &sample.rows(), monitored);
        let (best, iteration_info) =
            optimize(policy, |seed| attempt(population, &sample, mode, &tester, seed));

        let proportions = StratumProportions::learn(&sample, &best.groups);
        let projected = extrapolate(strata, &proportions, best.seed);

        let cap = self.config.balance_sample_cap;
        let mut rng = StdRng::seed_from_u64(best.seed);
        let reference = capped(&strata.rows(), cap, &mut rng);
        let tester = BalanceTester::new(population, &reference, monitored);
        let balance = projected
            .groups
            .iter()
            .map(|rows| tester.test(population, &capped(rows, cap, &mut rng)))
            .collect();

        if projected.unassigned > 0 {
            debug!(unassigned = projected.unassigned, "rows left out by extrapolation rounding");
        }
        Assignment {
            groups: projected.groups,
            balance,
            iteration_info,
            memory_info: MemoryInfo {
                memory_efficient_processing: true,
                max_memory_rows,
                sample_rows: Some(sample.total_rows()),
                unassigned_rows: projected.unassigned,
                balance_sample_cap: Some(cap),
            },
        }
    }
}

fn split_in_memory(
    population: &Population,
    strata: &StrataIndex,
    mode: &SplitMode,
    policy: &IterationPolicy,
    monitored: &[String],
    max_memory_rows: usize,
) -> Assignment {
    let tester = BalanceTester::new(population, &strata.rows(), monitored);
    let (best, iteration_info) =
        optimize(policy, |seed| attempt(population, strata, mode, &tester, seed));
    Assignment {
        groups: best.groups,
        balance: best.balance,
        iteration_info,
        memory_info: MemoryInfo {
            memory_efficient_processing: false,
            max_memory_rows,
            sample_rows: None,
            unassigned_rows: 0,
            balance_sample_cap: None,
        },
    }
}

fn attempt(
    population: &Population,
    strata: &StrataIndex,
    mode: &SplitMode,
    tester: &BalanceTester,
    seed: u64,
) -> Candidate {
    let groups = split(strata, mode, seed);
    let balance = groups.iter().map(|rows| tester.test(population, rows)).collect();
    Candidate {
        groups,
        balance,
        seed,
    }
}

fn resolve_columns(population: &Population, names: &[String], role: &'static str) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            population
                .column_index(name)
                .ok_or_else(|| StratifyError::UnknownColumn {
                    column: name.clone(),
                    role,
                })
        })
        .collect()
}

/// Every numeric column except the identifier.
fn default_monitored(population: &Population, rows: &[usize], identifier: Option<usize>) -> Vec<String> {
    population
        .columns()
        .iter()
        .enumerate()
        .filter(|&(i, _)| Some(i) != identifier)
        .filter(|&(i, _)| population.column_kind(i, rows) == ColumnKind::Numeric)
        .map(|(_, name)| name.clone())
        .collect()
}

/// At most `cap` rows, drawn uniformly. Used only to bound balance-test cost.
fn capped(rows: &[usize], cap: usize, rng: &mut StdRng) -> Vec<usize> {
    if rows.len() <= cap {
        return rows.to_vec();
    }
    let mut picked: Vec<usize> = rows.choose_multiple(rng, cap).copied().collect();
    picked.sort_unstable();
    picked
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{Record, Value};

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let mut record = Record::new();
                record.insert("iin".into(), Value::Text(format!("{:012}", i)));
                record.insert("region".into(), Value::from(["north", "south", "east", "west"][i % 4]));
                record.insert("age".into(), Value::Int(20 + (i % 50) as i64));
                record
            })
            .collect()
    }

    #[test]
    fn test_identifier_detected_and_excluded_from_monitoring() {
        let engine = StratificationEngine::default();
        let request = StratificationRequest::new(rows(40), vec!["region".into()]).with_n_splits(2);
        let response = engine.run(request).unwrap();
        assert_eq!(response.identifier_column.as_deref(), Some("iin"));
        assert_eq!(response.monitored_columns, vec!["age"]);
        assert_eq!(response.groups[0].kind, GroupKind::Control);
        assert_eq!(response.groups[1].kind, GroupKind::Target);
    }

    #[test]
    fn test_duplicates_excluded_before_counting() {
        let mut data = rows(40);
        data.push(data[0].clone());
        let mut blank = data[1].clone();
        blank.insert("iin".into(), Value::from("  "));
        data.push(blank);

        let engine = StratificationEngine::default();
        let response = engine
            .run(StratificationRequest::new(data, vec!["region".into()]).with_n_splits(2))
            .unwrap();
        assert_eq!(response.excluded_records, 2);
        assert_eq!(response.total_rows, 40);
        assert_eq!(response.assigned_rows(), 40);
    }

    #[test]
    fn test_unknown_stratify_column_is_validation_error() {
        let engine = StratificationEngine::default();
        let err = engine
            .run(StratificationRequest::new(rows(10), vec!["missing".into()]).with_n_splits(2))
            .unwrap_err();
        assert!(matches!(err, StratifyError::UnknownColumn { role: "stratify", .. }));
    }

    #[test]
    fn test_test_set_removed_from_pool() {
        let engine = StratificationEngine::default();
        let request = StratificationRequest::new(rows(100), vec!["region".into()])
            .with_n_splits(2)
            .with_test_size(0.2);
        let response = engine.run(request).unwrap();
        let test_set = response.test_set.as_ref().unwrap();
        assert_eq!(test_set.row_count, 20);
        assert_eq!(response.total_rows, 80);
        assert_eq!(response.assigned_rows(), 80);
    }

    #[test]
    fn test_hold_out_of_whole_pool_is_insufficient() {
        let engine = StratificationEngine::default();
        let request = StratificationRequest::new(rows(200), vec!["region".into()])
            .with_n_splits(3)
            .with_test_size(0.999);
        let err = engine.run(request).unwrap_err();
        assert!(matches!(err, StratifyError::InsufficientStrata { .. }));
        assert_eq!(err.stage(), crate::error::Stage::Preparation);
    }

    #[test]
    fn test_proportions_reported() {
        let engine = StratificationEngine::default();
        let request =
            StratificationRequest::new(rows(100), vec!["region".into()]).with_split_sizes(vec![0.6, 0.4]);
        let response = engine.run(request).unwrap();
        assert_eq!(response.groups[0].proportion, 0.6);
        assert_eq!(response.groups[0].requested_proportion, Some(0.6));
        assert!(response.iteration_info.is_none());
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(1.0 / 3.0), 0.3333);
        assert_eq!(round4(0.66666), 0.6667);
    }
}
