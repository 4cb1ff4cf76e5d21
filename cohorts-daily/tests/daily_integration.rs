//! Daily assignment against an in-memory libSQL store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use cohorts_core::GroupKind;
use cohorts_daily::storage::{Error, Result};
use cohorts_daily::{
    Campaign, CampaignGroup, CampaignStore, CandidateSource, CohortAssigner, DailyConfig,
    DualSinkWriter, MemberRow, MemberSink, RunStage, RunStatus, SkipReason, TabMetadata,
    TursoCampaignStore, TursoMemberSink,
};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 5).unwrap()
}

fn campaign(n: u64) -> Campaign {
    Campaign {
        base_id: format!("SC{n:08}"),
        name: format!("campaign {n}"),
        start_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 10, 31).unwrap(),
        description: None,
        created_by: None,
    }
}

fn groups(campaign: &Campaign, count: u32) -> Vec<CampaignGroup> {
    (1..=count)
        .map(|ordinal| {
            CampaignGroup::new(
                &campaign.base_id,
                ordinal,
                TabMetadata::from_values([format!("tab-{ordinal}")]),
            )
        })
        .collect()
}

fn identifiers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{:012}", 880_000 + i)).collect()
}

/// Sink that rejects every write.
struct DownSink;

#[async_trait]
impl MemberSink for DownSink {
    fn name(&self) -> &str {
        "mirror"
    }

    async fn insert(&self, _row: &MemberRow) -> Result<()> {
        Err(Error::SinkUnavailable {
            sink: "mirror".into(),
            message: "timeout".into(),
        })
    }
}

/// Candidate source that always errors.
struct BrokenSource;

#[async_trait]
impl CandidateSource for BrokenSource {
    async fn candidates(&self, _day: NaiveDate) -> Result<Vec<String>> {
        Err(Error::InvalidData("source offline".into()))
    }
}

/// Candidate source that records calls.
#[derive(Default)]
struct FixedSource {
    ids: Vec<String>,
    calls: Mutex<usize>,
}

#[async_trait]
impl CandidateSource for FixedSource {
    async fn candidates(&self, _day: NaiveDate) -> Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.ids.clone())
    }
}

/// Store that delegates to libSQL but fails selected reads.
struct FailingStore {
    inner: TursoCampaignStore,
    fail_active: bool,
    fail_groups_for: Option<String>,
}

impl FailingStore {
    fn active_down(inner: TursoCampaignStore) -> Self {
        Self {
            inner,
            fail_active: true,
            fail_groups_for: None,
        }
    }

    fn groups_down_for(inner: TursoCampaignStore, base_id: &str) -> Self {
        Self {
            inner,
            fail_active: false,
            fail_groups_for: Some(base_id.to_string()),
        }
    }
}

#[async_trait]
impl CampaignStore for FailingStore {
    async fn active_campaigns(&self, day: NaiveDate) -> Result<Vec<Campaign>> {
        if self.fail_active {
            return Err(Error::InvalidData("campaigns table locked".into()));
        }
        self.inner.active_campaigns(day).await
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        self.inner.list_campaigns().await
    }

    async fn campaign_groups(&self, base_id: &str) -> Result<Vec<CampaignGroup>> {
        if self.fail_groups_for.as_deref() == Some(base_id) {
            return Err(Error::InvalidData(format!("groups of {base_id} unreadable")));
        }
        self.inner.campaign_groups(base_id).await
    }

    async fn create_campaign(&self, campaign: &Campaign, groups: &[CampaignGroup]) -> Result<()> {
        self.inner.create_campaign(campaign, groups).await
    }

    async fn next_base_id(&self) -> Result<String> {
        self.inner.next_base_id().await
    }
}

struct Harness {
    store: TursoCampaignStore,
    control: TursoMemberSink,
    target: TursoMemberSink,
    mirror: TursoMemberSink,
}

impl Harness {
    async fn new() -> Self {
        let store = TursoCampaignStore::new_memory().await.unwrap();
        let config = DailyConfig::default();
        Self {
            control: store.member_sink(&config.control_sink).await.unwrap(),
            target: store.member_sink(&config.target_sink).await.unwrap(),
            mirror: store.member_sink(&config.mirror_sink).await.unwrap(),
            store,
        }
    }

    fn writer(&self) -> DualSinkWriter {
        DualSinkWriter::new(
            Arc::new(self.control.clone()),
            Arc::new(self.target.clone()),
            Arc::new(self.mirror.clone()),
            "daily",
        )
    }

    fn assigner_with_store(
        &self,
        store: Arc<dyn CampaignStore>,
        source: Arc<dyn CandidateSource>,
    ) -> CohortAssigner {
        CohortAssigner::new(store, source, self.writer(), DailyConfig::default())
    }

    fn assigner(&self, source: Arc<dyn CandidateSource>) -> CohortAssigner {
        CohortAssigner::new(
            Arc::new(self.store.clone()),
            source,
            self.writer(),
            DailyConfig::default(),
        )
    }

    async fn add_campaign(&self, n: u64, group_count: u32) -> Campaign {
        let c = campaign(n);
        self.store.create_campaign(&c, &groups(&c, group_count)).await.unwrap();
        c
    }
}

#[tokio::test]
async fn no_active_campaigns_is_a_successful_skip() {
    let harness = Harness::new().await;
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });

    let report = harness.assigner(source.clone()).run_for(day()).await;

    assert!(report.success);
    assert_eq!(report.status, RunStatus::SkippedNoCampaigns);
    assert_eq!(report.skip_reason, Some(SkipReason::NoActiveCampaigns));
    assert_eq!(report.skip_reason.unwrap().as_str(), "no_active_campaigns");
    assert!(report.error_message.is_none());
    assert_eq!(*source.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn no_candidates_is_a_successful_skip() {
    let harness = Harness::new().await;
    harness.add_campaign(1, 2).await;

    let source = Arc::new(FixedSource {
        ids: vec!["  ".into(), String::new()],
        ..FixedSource::default()
    });
    let report = harness.assigner(source).run_for(day()).await;

    assert!(report.success);
    assert_eq!(report.status, RunStatus::SkippedNoCandidates);
    assert_eq!(report.blanks_dropped, 2);
    assert_eq!(harness.control.count().await.unwrap(), 0);
}

#[tokio::test]
async fn candidates_split_across_campaigns_with_remainder_last() {
    let harness = Harness::new().await;
    for n in 1..=3 {
        harness.add_campaign(n, 2).await;
    }
    harness.store.import_candidates(day(), &identifiers(100)).await.unwrap();

    let report = harness.assigner(Arc::new(harness.store.clone())).run_for(day()).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stage, RunStage::Finished);
    assert_eq!(report.campaigns_found, 3);
    let allocated: Vec<usize> = report.campaigns.iter().map(|c| c.allocated).collect();
    assert_eq!(allocated, vec![33, 33, 34]);
    assert_eq!(report.users_distributed, 100);
    assert_eq!(
        harness.control.count().await.unwrap() + harness.target.count().await.unwrap(),
        100
    );
    assert_eq!(harness.mirror.count().await.unwrap(), harness.target.count().await.unwrap());
}

#[tokio::test]
async fn groups_keep_kind_and_metadata() {
    let harness = Harness::new().await;
    let c = harness.add_campaign(7, 5).await;
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });

    let report = harness.assigner(source).run_for(day()).await;

    let groups = &report.campaigns[0].groups;
    assert_eq!(groups.iter().map(|g| g.allocated).collect::<Vec<_>>(), vec![2; 5]);
    assert_eq!(groups[0].kind, GroupKind::Control);
    assert!(groups[1..].iter().all(|g| g.kind == GroupKind::Target));
    assert!(groups.iter().all(|g| g.outcome.is_some()));

    let control_sub = format!("{}.1", c.base_id);
    assert_eq!(harness.control.identifiers(&control_sub).await.unwrap().len(), 2);
    assert_eq!(harness.target.count().await.unwrap(), 8);

    let stored = harness.store.campaign_groups(&c.base_id).await.unwrap();
    assert_eq!(stored[3].tab_metadata.tab1.as_deref(), Some("tab-4"));
}

#[tokio::test]
async fn duplicate_candidates_are_dropped_first_seen() {
    let harness = Harness::new().await;
    let c = harness.add_campaign(1, 2).await;
    let ids = vec!["A".to_string(), "B".into(), "A".into(), " C ".into(), "B".into()];
    let source = Arc::new(FixedSource {
        ids,
        ..FixedSource::default()
    });

    let report = harness.assigner(source).run_for(day()).await;

    assert_eq!(report.candidates_found, 3);
    assert_eq!(report.duplicates_dropped, 2);
    // [A] to control, [B, C] to the target group
    let control = harness.control.identifiers(&format!("{}.1", c.base_id)).await.unwrap();
    assert_eq!(control, vec!["A"]);
    let target = harness.target.identifiers(&format!("{}.2", c.base_id)).await.unwrap();
    assert_eq!(target, vec!["B", "C"]);
}

#[tokio::test]
async fn campaign_without_groups_is_skipped() {
    let harness = Harness::new().await;
    harness.store.create_campaign(&campaign(1), &[]).await.unwrap();
    harness.add_campaign(2, 2).await;
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });

    let report = harness.assigner(source).run_for(day()).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.campaigns[0].skipped_no_groups);
    assert_eq!(report.campaigns[0].users_distributed, 0);
    assert_eq!(report.campaigns[1].users_distributed, 5);
    assert_eq!(report.users_distributed, 5);
}

#[tokio::test]
async fn mirror_outage_does_not_fail_target_groups() {
    let harness = Harness::new().await;
    harness.add_campaign(1, 2).await;
    let writer = DualSinkWriter::new(
        Arc::new(harness.control.clone()),
        Arc::new(harness.target.clone()),
        Arc::new(DownSink),
        "daily",
    );
    let source = Arc::new(FixedSource {
        ids: identifiers(200),
        ..FixedSource::default()
    });
    let assigner = CohortAssigner::new(
        Arc::new(harness.store.clone()),
        source,
        writer,
        DailyConfig::default(),
    );

    let report = assigner.run_for(day()).await;

    assert!(report.success);
    let target = report.campaigns[0].groups[1].outcome.as_ref().unwrap();
    assert_eq!(target.kind, GroupKind::Target);
    assert!(target.success);
    assert_eq!(target.primary.inserted_count, 100);
    let secondary = target.secondary.as_ref().unwrap();
    assert!(!secondary.success);
    assert_eq!(secondary.inserted_count, 0);
    assert!(secondary.error.as_deref().unwrap().contains("timeout"));
}

#[tokio::test]
async fn candidate_source_error_fails_run_with_stage() {
    let harness = Harness::new().await;
    harness.add_campaign(1, 2).await;

    let report = harness.assigner(Arc::new(BrokenSource)).run_for(day()).await;

    assert!(!report.success);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stage, RunStage::FetchCandidates);
    assert!(report.error_message.unwrap().starts_with("[fetch_candidates]"));
}

#[tokio::test]
async fn inactive_campaigns_are_ignored() {
    let harness = Harness::new().await;
    let mut expired = campaign(1);
    expired.end_date = NaiveDate::from_ymd_opt(2026, 10, 4).unwrap();
    harness.store.create_campaign(&expired, &groups(&expired, 2)).await.unwrap();

    let source = Arc::new(FixedSource {
        ids: identifiers(4),
        ..FixedSource::default()
    });
    let report = harness.assigner(source).run_for(day()).await;
    assert_eq!(report.status, RunStatus::SkippedNoCampaigns);
}

#[tokio::test]
async fn campaign_fetch_error_fails_run_with_stage() {
    let harness = Harness::new().await;
    harness.add_campaign(1, 2).await;
    let store = Arc::new(FailingStore::active_down(harness.store.clone()));
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });

    let report = harness.assigner_with_store(store, source.clone()).run_for(day()).await;

    assert!(!report.success);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stage, RunStage::FetchCampaigns);
    let message = report.error_message.unwrap();
    assert!(message.starts_with("[fetch_campaigns]"));
    assert!(message.contains("campaigns table locked"));
    assert_eq!(*source.calls.lock().unwrap(), 0);
    assert_eq!(harness.control.count().await.unwrap(), 0);
}

#[tokio::test]
async fn group_read_error_is_reported_per_campaign() {
    let harness = Harness::new().await;
    let broken = harness.add_campaign(1, 2).await;
    let healthy = harness.add_campaign(2, 2).await;
    let store = Arc::new(FailingStore::groups_down_for(
        harness.store.clone(),
        &broken.base_id,
    ));
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });

    let report = harness.assigner_with_store(store, source).run_for(day()).await;

    assert!(report.success);
    assert_eq!(report.status, RunStatus::Completed);
    let failed = &report.campaigns[0];
    assert_eq!(failed.base_id, broken.base_id);
    assert!(failed.error.as_deref().unwrap().contains("unreadable"));
    assert_eq!(failed.allocated, 5);
    assert_eq!(failed.users_distributed, 0);
    assert!(failed.groups.is_empty());
    assert_eq!(report.campaigns[1].base_id, healthy.base_id);
    assert!(report.campaigns[1].error.is_none());
    assert_eq!(report.campaigns[1].users_distributed, 5);
    assert_eq!(report.users_distributed, 5);
}

#[tokio::test]
async fn preview_allocates_without_writing() {
    let harness = Harness::new().await;
    harness.add_campaign(1, 3).await;
    harness.add_campaign(2, 2).await;
    let source = Arc::new(FixedSource {
        ids: identifiers(10),
        ..FixedSource::default()
    });
    let assigner = harness.assigner(source);

    let preview = assigner.preview(day()).await;

    assert!(preview.success);
    assert!(preview.dry_run);
    assert_eq!(preview.status, RunStatus::Completed);
    assert_eq!(preview.users_distributed, 0);
    assert!(preview.campaigns.iter().flat_map(|c| &c.groups).all(|g| g.outcome.is_none()));
    assert_eq!(harness.control.count().await.unwrap(), 0);
    assert_eq!(harness.target.count().await.unwrap(), 0);
    assert_eq!(harness.mirror.count().await.unwrap(), 0);

    let run = assigner.run_for(day()).await;

    assert!(!run.dry_run);
    let shares = |report: &cohorts_daily::RunReport| -> Vec<Vec<(String, usize)>> {
        report
            .campaigns
            .iter()
            .map(|c| c.groups.iter().map(|g| (g.sub_id.clone(), g.allocated)).collect())
            .collect()
    };
    assert_eq!(shares(&preview), shares(&run));
    assert_eq!(run.users_distributed, 10);
}
