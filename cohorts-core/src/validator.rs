//! Seed iteration until groups are balanced.
//!
//! A split attempt is scored by the minimum p-value across all groups and
//! monitored columns. Attempts run with seeds `base + i * stride` until every
//! group's minimum p-value reaches the threshold, or the iteration budget runs
//! out. The attempt with the highest overall minimum is kept either way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::balance::BalanceResult;

/// One scored split attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Group member rows, one entry per group
    pub groups: Vec<Vec<usize>>,
    /// Balance results, one entry per group
    pub balance: Vec<Vec<BalanceResult>>,
    pub seed: u64,
}

impl Candidate {
    /// Minimum p-value within one group, `None` when nothing was tested.
    pub fn group_min_p_value(&self, group: usize) -> Option<f64> {
        self.balance
            .get(group)?
            .iter()
            .map(|r| r.p_value)
            .min_by(f64::total_cmp)
    }

    /// Minimum p-value across every group. Untested candidates score 1.0.
    pub fn min_p_value(&self) -> f64 {
        (0..self.balance.len())
            .filter_map(|g| self.group_min_p_value(g))
            .min_by(f64::total_cmp)
            .unwrap_or(1.0)
    }

    /// True when every group's minimum p-value reaches `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        (0..self.balance.len()).all(|g| self.group_min_p_value(g).is_none_or(|p| p >= threshold))
    }
}

/// Summary of the seed iteration, reported alongside the groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationInfo {
    pub iterations_performed: u32,
    pub criteria_met: bool,
    pub target_p_value: f64,
    /// Per-group minimum p-value of the kept attempt, keyed `group_<ordinal>`
    pub achieved_min_p_values: BTreeMap<String, Option<f64>>,
    pub max_iterations: u32,
    /// Seed of the kept attempt
    pub seed: u64,
}

/// Seed schedule and stopping rule.
#[derive(Debug, Clone, Copy)]
pub struct IterationPolicy {
    pub base_seed: u64,
    pub stride: u64,
    pub max_iterations: u32,
    /// `None` disables iteration: a single attempt is made
    pub min_p_value: Option<f64>,
}

impl IterationPolicy {
    /// Seed for the zero-based `iteration`.
    #[must_use]
    pub fn seed_for(&self, iteration: u32) -> u64 {
        self.base_seed
            .wrapping_add(u64::from(iteration).wrapping_mul(self.stride))
    }
}

/// Run attempts under `policy`, keeping the best. `attempt` maps a seed to a
/// scored candidate.
pub fn optimize<F>(policy: &IterationPolicy, mut attempt: F) -> (Candidate, Option<IterationInfo>)
where
    F: FnMut(u64) -> Candidate,
{
    let Some(threshold) = policy.min_p_value else {
        return (attempt(policy.base_seed), None);
    };

    let max_iterations = policy.max_iterations.max(1);
    let mut best: Option<Candidate> = None;
    let mut performed = 0;
    let mut met = false;

    for iteration in 0..max_iterations {
        let seed = policy.seed_for(iteration);
        let candidate = attempt(seed);
        performed = iteration + 1;

        let score = candidate.min_p_value();
        met = candidate.meets(threshold);
        debug!(iteration, seed, min_p_value = score, criteria_met = met, "balance iteration");

        let better = best
            .as_ref()
            .is_none_or(|b| score.total_cmp(&b.min_p_value()).is_gt());
        if met || better {
            best = Some(candidate);
        }
        if met {
            break;
        }
    }

    // max_iterations >= 1 so at least one attempt ran
    let best = match best {
        Some(best) => best,
        None => attempt(policy.base_seed),
    };

    let achieved_min_p_values = (0..best.groups.len())
        .map(|g| (format!("group_{}", g + 1), best.group_min_p_value(g)))
        .collect();
    let info = IterationInfo {
        iterations_performed: performed,
        criteria_met: met,
        target_p_value: threshold,
        achieved_min_p_values,
        max_iterations,
        seed: best.seed,
    };
    info!(
        iterations = performed,
        criteria_met = met,
        min_p_value = best.min_p_value(),
        seed = best.seed,
        "balance iteration finished"
    );
    (best, Some(info))
}
