//! Stratified splitting of a prepared population into groups.
//!
//! Both modes keep each stratum's share of every group close to that
//! stratum's share of the population:
//!
//! - [`SplitMode::EqualFolds`] deals each stratum's shuffled rows across the
//!   folds round-robin, continuing the rotation from one stratum to the next
//!   so fold sizes differ by at most one.
//! - [`SplitMode::Proportions`] peels groups off one at a time. Group `i`
//!   takes `p_i / (p_i + ... + p_k)` of what is left, allocated across strata
//!   by largest remainder. The last group takes everything remaining.
//!
//! All randomness comes from a seeded [`StdRng`], so a seed fully determines
//! the result.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::strata::StrataIndex;

/// Reported name of a [`SplitMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    EqualKfold,
    CustomProportions,
}

impl SplitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EqualKfold => "equal_kfold",
            Self::CustomProportions => "custom_proportions",
        }
    }
}

/// How the population is divided.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitMode {
    /// `k` groups of (near) equal size
    EqualFolds(usize),
    /// One group per proportion; proportions sum to 1.0
    Proportions(Vec<f64>),
}

impl SplitMode {
    /// Number of groups this mode produces.
    pub fn group_count(&self) -> usize {
        match self {
            Self::EqualFolds(k) => *k,
            Self::Proportions(sizes) => sizes.len(),
        }
    }

    /// Requested fraction of the population for each group.
    pub fn requested_proportions(&self) -> Vec<f64> {
        match self {
            Self::EqualFolds(k) => vec![1.0 / *k as f64; *k],
            Self::Proportions(sizes) => sizes.clone(),
        }
    }

    pub fn method(&self) -> SplitMethod {
        match self {
            Self::EqualFolds(_) => SplitMethod::EqualKfold,
            Self::Proportions(_) => SplitMethod::CustomProportions,
        }
    }
}

/// Split `strata` into groups. Every row lands in exactly one group and each
/// group's rows are returned in ascending order.
pub fn split(strata: &StrataIndex, mode: &SplitMode, seed: u64) -> Vec<Vec<usize>> {
    let mut groups = match mode {
        SplitMode::EqualFolds(k) => equal_folds(strata, *k, seed),
        SplitMode::Proportions(sizes) => proportional(strata, sizes, seed),
    };
    for group in &mut groups {
        group.sort_unstable();
    }
    groups
}

/// Set aside `fraction` of the population, stratified, before splitting.
/// Returns the held-out rows (ascending) and the strata that remain.
pub fn hold_out(strata: &StrataIndex, fraction: f64, seed: u64) -> (Vec<usize>, StrataIndex) {
    let n = strata.total_rows();
    let target = ceil_share(fraction, n).min(n);
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut taken, rest) = take_stratified(strata, target, &mut rng);
    taken.sort_unstable();
    (taken, rest)
}

fn equal_folds(strata: &StrataIndex, k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    if k == 0 {
        return folds;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut cursor = rng.gen_range(0..k);
    for stratum in strata.iter() {
        let mut rows = stratum.rows.clone();
        rows.shuffle(&mut rng);
        for row in rows {
            folds[cursor].push(row);
            cursor = (cursor + 1) % k;
        }
    }
    folds
}

fn proportional(strata: &StrataIndex, sizes: &[f64], seed: u64) -> Vec<Vec<usize>> {
    let mut groups = Vec::with_capacity(sizes.len());
    let mut remaining = strata.clone();

    for i in 0..sizes.len().saturating_sub(1) {
        let rest: f64 = sizes[i..].iter().sum();
        let relative = if rest > 0.0 { sizes[i] / rest } else { 0.0 };

        let n = remaining.total_rows();
        let target = ceil_share(relative, n);
        let target = if n >= 2 {
            target.clamp(1, n - 1)
        } else {
            target.min(n)
        };

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
        let (taken, rest) = take_stratified(&remaining, target, &mut rng);
        groups.push(taken);
        remaining = rest;
    }

    if !sizes.is_empty() {
        groups.push(remaining.rows());
    }
    groups
}

fn ceil_share(fraction: f64, n: usize) -> usize {
    (fraction * n as f64 - 1e-9).ceil().max(0.0) as usize
}

/// Draw `target` rows spread across strata in proportion to their sizes.
fn take_stratified(strata: &StrataIndex, target: usize, rng: &mut StdRng) -> (Vec<usize>, StrataIndex) {
    let allocation = allocate(strata, target, rng);
    let mut taken = Vec::with_capacity(target);
    let mut rest = Vec::with_capacity(strata.len());

    for (stratum, take) in strata.iter().zip(allocation) {
        let mut rows = stratum.rows.clone();
        rows.shuffle(rng);
        let kept = rows.split_off(take);
        taken.extend(rows);
        if !kept.is_empty() {
            rest.push((stratum.key.clone(), kept));
        }
    }
    (taken, StrataIndex::from_parts(rest))
}

/// Largest-remainder allocation of `target` rows over strata. Ties in the
/// fractional part are broken in shuffled order.
fn allocate(strata: &StrataIndex, target: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = strata.total_rows();
    if n == 0 || target == 0 {
        return vec![0; strata.len()];
    }

    let sizes: Vec<usize> = strata.iter().map(|s| s.rows.len()).collect();
    let mut counts = Vec::with_capacity(sizes.len());
    let mut fractions = Vec::with_capacity(sizes.len());
    for &size in &sizes {
        let exact = size as f64 * target as f64 / n as f64;
        let base = (exact.floor() as usize).min(size);
        counts.push(base);
        fractions.push(exact - base as f64);
    }

    let mut leftover = target.saturating_sub(counts.iter().sum());
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.shuffle(rng);
    order.sort_by(|&a, &b| fractions[b].total_cmp(&fractions[a]));

    for i in order {
        if leftover == 0 {
            break;
        }
        if counts[i] < sizes[i] {
            counts[i] += 1;
            leftover -= 1;
        }
    }
    counts
}
