use cohorts_core::EngineConfig;
use cohorts_daily::DailyConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCohortsConfig {
    #[serde(default)]
    pub engine: RawEngineConfig,

    #[serde(default)]
    pub daily: RawDailyConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Engine config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawEngineConfig {
    pub max_memory_rows: Option<usize>,
    pub sample_size: Option<usize>,
    pub min_sample_per_stratum: Option<usize>,
    pub balance_sample_cap: Option<usize>,
    pub max_iterations: Option<u32>,
    pub random_seed: Option<u64>,
    pub seed_stride: Option<u64>,
}

/// Daily run config as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDailyConfig {
    pub utc_offset_minutes: Option<i32>,
    pub control_sink: Option<String>,
    pub target_sink: Option<String>,
    pub mirror_sink: Option<String>,
    pub load_tag: Option<String>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CohortsConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub daily: DailyConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where campaigns and members are stored.
///
/// `url` selects a remote libSQL database; otherwise `path` (or the default
/// data-directory file) is opened locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Database holding the mirror sink table. The mirror table lives in the
    /// primary database when this section is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorStorageConfig>,
}

/// `[storage.mirror]`: a local `path`, or a remote `url` with `auth_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MirrorStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CohortsConfig::default();
        assert_eq!(config.engine.max_memory_rows, 1_500_000);
        assert_eq!(config.daily.utc_offset_minutes, 300);
        assert!(config.storage.path.is_none());
        assert!(config.storage.url.is_none());
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[engine]
sample_size = 1000

[daily]
load_tag = "nightly"
"#;
        let raw: RawCohortsConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.engine.sample_size, Some(1000));
        assert!(raw.engine.max_iterations.is_none());
        assert_eq!(raw.daily.load_tag.as_deref(), Some("nightly"));
        assert!(raw.daily.control_sink.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawCohortsConfig = toml::from_str("").unwrap();

        assert!(raw.engine.random_seed.is_none());
        assert!(raw.daily.utc_offset_minutes.is_none());
        assert_eq!(raw.storage, StorageConfig::default());
    }

    #[test]
    fn test_storage_section_omits_unset_fields() {
        let config = CohortsConfig {
            storage: StorageConfig {
                path: Some(PathBuf::from("/var/lib/cohorts/cohorts.db")),
                ..StorageConfig::default()
            },
            ..CohortsConfig::default()
        };

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("path = \"/var/lib/cohorts/cohorts.db\""));
        assert!(!toml_str.contains("auth_token"));
        assert!(!toml_str.contains("mirror"));
    }

    #[test]
    fn test_mirror_section_parses() {
        let toml_str = r#"
[storage]
path = "/data/cohorts.db"

[storage.mirror]
url = "libsql://mirror.example.turso.io"
auth_token = "secret"
"#;
        let raw: RawCohortsConfig = toml::from_str(toml_str).unwrap();

        let mirror = raw.storage.mirror.unwrap();
        assert_eq!(mirror.url.as_deref(), Some("libsql://mirror.example.turso.io"));
        assert_eq!(mirror.auth_token.as_deref(), Some("secret"));
        assert!(mirror.path.is_none());
    }
}
