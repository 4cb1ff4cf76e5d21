//! Stratified sub-sampling of oversized populations.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::strata::StrataIndex;

/// Draws a stratified sample small enough to split in memory.
#[derive(Debug, Clone)]
pub struct PopulationSampler {
    sample_size: usize,
    min_per_stratum: usize,
    rng: StdRng,
}

impl PopulationSampler {
    /// Create with a seed for reproducible samples.
    pub fn with_seed(sample_size: usize, min_per_stratum: usize, seed: u64) -> Self {
        Self {
            sample_size,
            min_per_stratum,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sample `strata`. Each stratum contributes up to
    /// `max(ceil(sample_size / strata), min_per_stratum, min_members)` rows;
    /// if that falls short of `sample_size`, the gap is filled by uniform
    /// draws from the rows left over. The sample never exceeds the
    /// population.
    pub fn sample(&mut self, strata: &StrataIndex, min_members: usize) -> StrataIndex {
        if strata.is_empty() {
            return StrataIndex::default();
        }

        let per_stratum = self
            .sample_size
            .div_ceil(strata.len())
            .max(self.min_per_stratum)
            .max(min_members);

        let mut picked = Vec::with_capacity(self.sample_size);
        let mut leftover = Vec::new();
        for stratum in strata.iter() {
            let mut rows = stratum.rows.clone();
            rows.shuffle(&mut self.rng);
            let rest = rows.split_off(per_stratum.min(rows.len()));
            picked.extend(rows);
            leftover.extend(rest);
        }

        let shortfall = self.sample_size.saturating_sub(picked.len());
        let topped_up = shortfall.min(leftover.len());
        if topped_up > 0 {
            leftover.shuffle(&mut self.rng);
            picked.extend_from_slice(&leftover[..topped_up]);
        }

        debug!(
            population = strata.total_rows(),
            strata = strata.len(),
            per_stratum,
            topped_up,
            sample = picked.len(),
            "sampled population"
        );
        strata.restrict(&picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strata(sizes: &[usize]) -> StrataIndex {
        let mut next = 0;
        StrataIndex::from_parts(sizes.iter().enumerate().map(|(i, &size)| {
            let rows: Vec<usize> = (next..next + size).collect();
            next += size;
            (format!("s{i}"), rows)
        }))
    }

    #[test]
    fn test_even_quota_per_stratum() {
        let index = strata(&[1000, 1000, 1000, 1000]);
        let sample = PopulationSampler::with_seed(400, 10, 42).sample(&index, 2);
        assert_eq!(sample.total_rows(), 400);
        for stratum in sample.iter() {
            assert_eq!(stratum.rows.len(), 100);
        }
    }

    #[test]
    fn test_small_strata_get_topped_up_elsewhere() {
        let index = strata(&[20, 1000]);
        let sample = PopulationSampler::with_seed(200, 10, 1).sample(&index, 2);
        assert_eq!(sample.total_rows(), 200);
        assert_eq!(sample.get("s0").map(<[usize]>::len), Some(20));
    }

    #[test]
    fn test_minimum_per_stratum_is_kept() {
        let index = strata(&[50, 50, 50]);
        let sample = PopulationSampler::with_seed(6, 10, 1).sample(&index, 2);
        for stratum in sample.iter() {
            assert_eq!(stratum.rows.len(), 10);
        }
    }

    #[test]
    fn test_never_exceeds_population() {
        let index = strata(&[5, 7]);
        let sample = PopulationSampler::with_seed(1000, 10, 1).sample(&index, 2);
        assert_eq!(sample.total_rows(), 12);
    }

    #[test]
    fn test_seed_determines_sample() {
        let index = strata(&[300, 300]);
        let a = PopulationSampler::with_seed(100, 10, 7).sample(&index, 2);
        let b = PopulationSampler::with_seed(100, 10, 7).sample(&index, 2);
        assert_eq!(a, b);
    }
}
