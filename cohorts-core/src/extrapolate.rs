//! Projection of sample group proportions onto the full population.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::strata::StrataIndex;

/// Per-stratum share of each group, learned from a split of the sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratumProportions {
    groups: usize,
    by_stratum: BTreeMap<String, Vec<f64>>,
}

impl StratumProportions {
    /// Learn proportions from `groups` (rows of the sample) over the sample's
    /// strata.
    pub fn learn(sample: &StrataIndex, groups: &[Vec<usize>]) -> Self {
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for (g, rows) in groups.iter().enumerate() {
            for &row in rows {
                group_of.insert(row, g);
            }
        }

        let by_stratum = sample
            .iter()
            .map(|stratum| {
                let mut counts = vec![0usize; groups.len()];
                for row in &stratum.rows {
                    if let Some(&g) = group_of.get(row) {
                        counts[g] += 1;
                    }
                }
                let size = stratum.rows.len().max(1) as f64;
                let shares = counts.into_iter().map(|c| c as f64 / size).collect();
                (stratum.key.clone(), shares)
            })
            .collect();

        Self {
            groups: groups.len(),
            by_stratum,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Shares of each group within the stratum `key`.
    pub fn shares(&self, key: &str) -> Option<&[f64]> {
        self.by_stratum.get(key).map(Vec::as_slice)
    }
}

/// Full-population groups built from learned proportions.
#[derive(Debug, Clone, PartialEq)]
pub struct Extrapolation {
    /// Member rows per group, ascending
    pub groups: Vec<Vec<usize>>,
    /// Rows left out by rounding down (or strata unseen in the sample)
    pub unassigned: usize,
}

/// Assign full-population rows per stratum: each group takes
/// `floor(count * share)` rows drawn without replacement from the shuffled
/// stratum. Rounding can only leave rows out, never over-assign.
pub fn extrapolate(full: &StrataIndex, proportions: &StratumProportions, seed: u64) -> Extrapolation {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); proportions.group_count()];
    let mut unassigned = 0;

    for stratum in full.iter() {
        let Some(shares) = proportions.shares(&stratum.key) else {
            debug!(stratum = %stratum.key, rows = stratum.rows.len(), "stratum missing from sample");
            unassigned += stratum.rows.len();
            continue;
        };

        let mut rows = stratum.rows.clone();
        rows.shuffle(&mut rng);
        let count = rows.len();
        let mut cursor = 0;
        for (g, share) in shares.iter().enumerate() {
            let take = ((count as f64 * share + 1e-9).floor() as usize).min(count - cursor);
            groups[g].extend_from_slice(&rows[cursor..cursor + take]);
            cursor += take;
        }
        unassigned += count - cursor;
    }

    for group in &mut groups {
        group.sort_unstable();
    }
    Extrapolation { groups, unassigned }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_shares_per_stratum() {
        let sample = StrataIndex::from_parts([
            ("a".to_string(), vec![0, 1, 2, 3]),
            ("b".to_string(), vec![4, 5]),
        ]);
        let groups = vec![vec![0, 1, 2, 4], vec![3, 5]];
        let props = StratumProportions::learn(&sample, &groups);
        assert_eq!(props.shares("a"), Some(&[0.75, 0.25][..]));
        assert_eq!(props.shares("b"), Some(&[0.5, 0.5][..]));
        assert_eq!(props.group_count(), 2);
    }

    #[test]
    fn test_extrapolate_never_overcounts() {
        let sample = StrataIndex::from_parts([("a".to_string(), vec![0, 1, 2])]);
        let props = StratumProportions::learn(&sample, &[vec![0], vec![1], vec![2]]);

        let full = StrataIndex::from_parts([("a".to_string(), (0..100).collect::<Vec<_>>())]);
        let result = extrapolate(&full, &props, 42);
        let sizes: Vec<usize> = result.groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![33, 33, 33]);
        assert_eq!(result.unassigned, 1);
    }

    #[test]
    fn test_extrapolated_groups_are_disjoint() {
        let sample = StrataIndex::from_parts([
            ("a".to_string(), vec![0, 1]),
            ("b".to_string(), vec![2, 3]),
        ]);
        let props = StratumProportions::learn(&sample, &[vec![0, 2], vec![1, 3]]);
        let full = StrataIndex::from_parts([
            ("a".to_string(), (0..50).collect::<Vec<_>>()),
            ("b".to_string(), (50..90).collect::<Vec<_>>()),
        ]);
        let result = extrapolate(&full, &props, 1);

        let mut all: Vec<usize> = result.groups.concat();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 90);
        assert_eq!(result.unassigned, 0);
    }

    #[test]
    fn test_unseen_stratum_is_unassigned() {
        let sample = StrataIndex::from_parts([("a".to_string(), vec![0, 1])]);
        let props = StratumProportions::learn(&sample, &[vec![0], vec![1]]);
        let full = StrataIndex::from_parts([
            ("a".to_string(), vec![0, 1, 2, 3]),
            ("z".to_string(), vec![4, 5]),
        ]);
        let result = extrapolate(&full, &props, 1);
        assert_eq!(result.unassigned, 2);
        assert_eq!(result.groups.concat().len(), 4);
    }
}
