//! Opening the campaign database and member sinks from configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cohorts_daily::{DailyConfig, DualSinkWriter, MemberSink, TursoCampaignStore, UnavailableSink};
use tracing::{debug, warn};

use crate::config::{MirrorStorageConfig, StorageConfig};

/// Open the configured database: remote when `url` is set, otherwise a local
/// file (default `data_dir()/cohorts.db`).
pub async fn open_store(config: &StorageConfig) -> Result<TursoCampaignStore> {
    match &config.url {
        Some(url) => open_remote(url, config.auth_token.as_deref()).await,
        None => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(cohorts_paths::default_database_path);
            open_local(&path).await
        }
    }
}

/// Open the `[storage.mirror]` database.
async fn open_mirror_store(mirror: &MirrorStorageConfig) -> Result<TursoCampaignStore> {
    match (&mirror.url, &mirror.path) {
        (Some(url), _) => open_remote(url, mirror.auth_token.as_deref()).await,
        (None, Some(path)) => open_local(path).await,
        (None, None) => bail!("[storage.mirror] needs either a path or a url"),
    }
}

async fn open_remote(url: &str, auth_token: Option<&str>) -> Result<TursoCampaignStore> {
    debug!(url = %url, "opening remote database");
    TursoCampaignStore::new_remote(url, auth_token.unwrap_or_default())
        .await
        .with_context(|| format!("connecting to {url}"))
}

async fn open_local(path: &Path) -> Result<TursoCampaignStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    debug!(path = %path.display(), "opening local database");
    TursoCampaignStore::new_local(path)
        .await
        .with_context(|| format!("opening {}", path.display()))
}

/// Build the member writer. Control and target tables live in `store`. The
/// mirror table lives in the `[storage.mirror]` database when one is
/// configured, otherwise in `store`.
///
/// A mirror database that cannot be opened does not stop the caller: its
/// writes fail one by one and are reported like any other mirror outage.
pub async fn open_writer(
    store: &TursoCampaignStore,
    storage: &StorageConfig,
    daily: &DailyConfig,
) -> Result<DualSinkWriter> {
    let control = store.member_sink(&daily.control_sink).await?;
    let target = store.member_sink(&daily.target_sink).await?;

    let mirror: Arc<dyn MemberSink> = match &storage.mirror {
        None => Arc::new(store.member_sink(&daily.mirror_sink).await?),
        Some(config) => match open_mirror_sink(config, &daily.mirror_sink).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                warn!(sink = %daily.mirror_sink, error = %format!("{e:#}"), "mirror database unavailable");
                Arc::new(UnavailableSink::new(&daily.mirror_sink, format!("{e:#}")))
            }
        },
    };

    Ok(DualSinkWriter::new(
        Arc::new(control),
        Arc::new(target),
        mirror,
        daily.load_tag.clone(),
    ))
}

async fn open_mirror_sink(
    config: &MirrorStorageConfig,
    table: &str,
) -> Result<cohorts_daily::TursoMemberSink> {
    let mirror_store = open_mirror_store(config).await?;
    let sink = mirror_store.member_sink(table).await?;
    debug!(sink = %table, "mirror sink on separate database");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cohorts_core::GroupKind;
    use cohorts_daily::{CampaignStore, GroupTarget, TabMetadata};
    use tempfile::TempDir;

    fn local(path: &Path) -> StorageConfig {
        StorageConfig {
            path: Some(path.to_path_buf()),
            ..StorageConfig::default()
        }
    }

    fn target_group() -> GroupTarget {
        let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        GroupTarget {
            sub_id: "SC00000001.2".into(),
            kind: GroupKind::Target,
            start_date: day,
            end_date: day,
            tab_metadata: TabMetadata::default(),
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{:012}", 700_000 + i)).collect()
    }

    #[tokio::test]
    async fn test_open_local_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/cohorts.db");

        let store = open_store(&local(&path)).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.next_base_id().await.unwrap(), "SC00000001");
    }

    #[tokio::test]
    async fn test_open_writer_rejects_bad_table_name() {
        let temp_dir = TempDir::new().unwrap();
        let config = local(&temp_dir.path().join("cohorts.db"));
        let store = open_store(&config).await.unwrap();
        let daily = DailyConfig {
            mirror_sink: "members; DROP TABLE campaigns".into(),
            ..DailyConfig::default()
        };

        assert!(open_writer(&store, &config, &daily).await.is_err());
    }

    #[tokio::test]
    async fn test_mirror_defaults_to_primary_database() {
        let temp_dir = TempDir::new().unwrap();
        let config = local(&temp_dir.path().join("cohorts.db"));
        let store = open_store(&config).await.unwrap();
        let daily = DailyConfig::default();

        let writer = open_writer(&store, &config, &daily).await.unwrap();
        let outcome = writer.write(&target_group(), &ids(3)).await;

        assert!(outcome.success);
        let mirror = store.member_sink(&daily.mirror_sink).await.unwrap();
        assert_eq!(mirror.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mirror_writes_to_separate_database() {
        let temp_dir = TempDir::new().unwrap();
        let mirror_path = temp_dir.path().join("mirror/mirror.db");
        let config = StorageConfig {
            mirror: Some(MirrorStorageConfig {
                path: Some(mirror_path.clone()),
                ..MirrorStorageConfig::default()
            }),
            ..local(&temp_dir.path().join("cohorts.db"))
        };
        let store = open_store(&config).await.unwrap();
        let daily = DailyConfig::default();

        let writer = open_writer(&store, &config, &daily).await.unwrap();
        let outcome = writer.write(&target_group(), &ids(4)).await;

        assert!(outcome.success);
        assert_eq!(outcome.secondary_inserted_count(), 4);
        let target = store.member_sink(&daily.target_sink).await.unwrap();
        assert_eq!(target.count().await.unwrap(), 4);
        let primary_mirror = store.member_sink(&daily.mirror_sink).await.unwrap();
        assert_eq!(primary_mirror.count().await.unwrap(), 0);

        let mirror_store = TursoCampaignStore::new_local(&mirror_path).await.unwrap();
        let mirror = mirror_store.member_sink(&daily.mirror_sink).await.unwrap();
        assert_eq!(mirror.identifiers("SC00000001.2").await.unwrap(), ids(4));
    }

    #[tokio::test]
    async fn test_incomplete_mirror_section_keeps_target_writes() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            mirror: Some(MirrorStorageConfig::default()),
            ..local(&temp_dir.path().join("cohorts.db"))
        };
        let store = open_store(&config).await.unwrap();

        let writer = open_writer(&store, &config, &DailyConfig::default()).await.unwrap();
        let outcome = writer.write(&target_group(), &ids(2)).await;

        assert!(outcome.success);
        assert_eq!(outcome.primary_inserted_count(), 2);
        let secondary = outcome.secondary.unwrap();
        assert!(!secondary.success);
        assert!(secondary.error.unwrap().contains("[storage.mirror]"));
    }
}
