use super::types::{
    CohortsConfig, MirrorStorageConfig, RawCohortsConfig, RawDailyConfig, RawEngineConfig,
    StorageConfig,
};
use anyhow::{Context, Result};
use cohorts_core::EngineConfig;
use cohorts_daily::DailyConfig;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<CohortsConfig> {
        Self::load_layers(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Get user config path (`$XDG_CONFIG_HOME/cohorts/config.toml`)
    pub fn user_config_path() -> PathBuf {
        cohorts_paths::user_config_file()
    }

    /// Get project config path
    /// Can be overridden with COHORTS_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        match std::env::var("COHORTS_PROJECT_CONFIG_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("config.toml"),
            _ => PathBuf::from(".cohorts/config.toml"),
        }
    }

    fn load_layers(user_path: &Path, project_path: &Path) -> Result<CohortsConfig> {
        let mut raw = RawCohortsConfig::default();

        // Layer 1: User config
        if let Some(user_config) = Self::read_raw(user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<Option<RawCohortsConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawCohortsConfig, overlay: RawCohortsConfig) -> RawCohortsConfig {
        RawCohortsConfig {
            engine: RawEngineConfig {
                max_memory_rows: overlay.engine.max_memory_rows.or(base.engine.max_memory_rows),
                sample_size: overlay.engine.sample_size.or(base.engine.sample_size),
                min_sample_per_stratum: overlay
                    .engine
                    .min_sample_per_stratum
                    .or(base.engine.min_sample_per_stratum),
                balance_sample_cap: overlay
                    .engine
                    .balance_sample_cap
                    .or(base.engine.balance_sample_cap),
                max_iterations: overlay.engine.max_iterations.or(base.engine.max_iterations),
                random_seed: overlay.engine.random_seed.or(base.engine.random_seed),
                seed_stride: overlay.engine.seed_stride.or(base.engine.seed_stride),
            },
            daily: RawDailyConfig {
                utc_offset_minutes: overlay
                    .daily
                    .utc_offset_minutes
                    .or(base.daily.utc_offset_minutes),
                control_sink: overlay.daily.control_sink.or(base.daily.control_sink),
                target_sink: overlay.daily.target_sink.or(base.daily.target_sink),
                mirror_sink: overlay.daily.mirror_sink.or(base.daily.mirror_sink),
                load_tag: overlay.daily.load_tag.or(base.daily.load_tag),
            },
            storage: StorageConfig {
                path: overlay.storage.path.or(base.storage.path),
                url: overlay.storage.url.or(base.storage.url),
                auth_token: overlay.storage.auth_token.or(base.storage.auth_token),
                mirror: match (overlay.storage.mirror, base.storage.mirror) {
                    (Some(overlay), Some(base)) => Some(MirrorStorageConfig {
                        path: overlay.path.or(base.path),
                        url: overlay.url.or(base.url),
                        auth_token: overlay.auth_token.or(base.auth_token),
                    }),
                    (overlay, base) => overlay.or(base),
                },
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawCohortsConfig) -> CohortsConfig {
        let engine = EngineConfig::default();
        let daily = DailyConfig::default();
        CohortsConfig {
            engine: EngineConfig {
                max_memory_rows: raw.engine.max_memory_rows.unwrap_or(engine.max_memory_rows),
                sample_size: raw.engine.sample_size.unwrap_or(engine.sample_size),
                min_sample_per_stratum: raw
                    .engine
                    .min_sample_per_stratum
                    .unwrap_or(engine.min_sample_per_stratum),
                balance_sample_cap: raw
                    .engine
                    .balance_sample_cap
                    .unwrap_or(engine.balance_sample_cap),
                max_iterations: raw.engine.max_iterations.unwrap_or(engine.max_iterations),
                random_seed: raw.engine.random_seed.unwrap_or(engine.random_seed),
                seed_stride: raw.engine.seed_stride.unwrap_or(engine.seed_stride),
            },
            daily: DailyConfig {
                utc_offset_minutes: raw
                    .daily
                    .utc_offset_minutes
                    .unwrap_or(daily.utc_offset_minutes),
                control_sink: raw.daily.control_sink.unwrap_or(daily.control_sink),
                target_sink: raw.daily.target_sink.unwrap_or(daily.target_sink),
                mirror_sink: raw.daily.mirror_sink.unwrap_or(daily.mirror_sink),
                load_tag: raw.daily.load_tag.unwrap_or(daily.load_tag),
            },
            storage: raw.storage,
        }
    }
}
