//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Defaults for every stratification run. Request fields override these per
/// call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Populations larger than this are sampled and extrapolated
    pub max_memory_rows: usize,
    /// Target sample size for oversized populations
    pub sample_size: usize,
    /// Minimum rows drawn from each stratum when sampling
    pub min_sample_per_stratum: usize,
    /// Rows per group (and reference) used for balance tests after
    /// extrapolation
    pub balance_sample_cap: usize,
    pub max_iterations: u32,
    pub random_seed: u64,
    /// Seed increment between validator iterations
    pub seed_stride: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_memory_rows: 1_500_000,
            sample_size: 500_000,
            min_sample_per_stratum: 10,
            balance_sample_cap: 50_000,
            max_iterations: 100,
            random_seed: 42,
            seed_stride: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str("max_iterations = 20\nrandom_seed = 7").unwrap();
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.max_memory_rows, 1_500_000);
        assert_eq!(config.seed_stride, 1000);
    }
}
