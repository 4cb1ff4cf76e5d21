//! Daily incremental assignment into existing campaign cohorts.
//!
//! ```text
//! fetch active campaigns → fetch candidates → [skip if either is empty]
//!   → split across campaigns → split across each campaign's groups
//!   → write through DualSinkWriter → report
//! ```
//!
//! A preview walks the same steps and stops short of the writer.
//!
//! Runs must not overlap: two concurrent runs would both assign the same
//! candidates. The caller (scheduler) enforces a single instance.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use crate::config::DailyConfig;
use crate::distribute::{clean_identifiers, partition};
use crate::report::{CampaignReport, GroupReport, RunReport, RunStage, SkipReason};
use crate::storage::{CampaignStore, CandidateSource};
use crate::types::Campaign;
use crate::writer::{DualSinkWriter, GroupTarget};

/// Distributes each day's newly-qualifying identifiers across the groups of
/// every active campaign.
pub struct CohortAssigner {
    store: Arc<dyn CampaignStore>,
    candidates: Arc<dyn CandidateSource>,
    writer: DualSinkWriter,
    config: DailyConfig,
}

impl CohortAssigner {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        candidates: Arc<dyn CandidateSource>,
        writer: DualSinkWriter,
        config: DailyConfig,
    ) -> Self {
        Self {
            store,
            candidates,
            writer,
            config,
        }
    }

    /// Run for today's business day. This is the scheduler entry point.
    pub async fn run(&self) -> RunReport {
        self.run_for(self.config.today()).await
    }

    /// Run for a specific business day.
    #[instrument(skip(self))]
    pub async fn run_for(&self, day: NaiveDate) -> RunReport {
        self.execute(day, false).await
    }

    /// Compute the allocations a run for `day` would make, writing nothing.
    #[instrument(skip(self))]
    pub async fn preview(&self, day: NaiveDate) -> RunReport {
        self.execute(day, true).await
    }

    async fn execute(&self, day: NaiveDate, dry_run: bool) -> RunReport {
        let mut report = RunReport::start(day);
        report.dry_run = dry_run;
        info!(run_id = %report.run_id, dry_run, "daily assignment started");

        let campaigns = match self.store.active_campaigns(day).await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                error!(error = %e, "failed to load active campaigns");
                return report.fail(e.to_string());
            }
        };
        report.campaigns_found = campaigns.len();
        if campaigns.is_empty() {
            info!("no active campaigns, skipping");
            return report.skip(SkipReason::NoActiveCampaigns);
        }

        report.stage = RunStage::FetchCandidates;
        let raw = match self.candidates.candidates(day).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "failed to load candidates");
                return report.fail(e.to_string());
            }
        };
        let clean = clean_identifiers(raw);
        report.candidates_found = clean.identifiers.len();
        report.duplicates_dropped = clean.duplicates;
        report.blanks_dropped = clean.blanks;
        if clean.duplicates > 0 || clean.blanks > 0 {
            info!(
                duplicates = clean.duplicates,
                blanks = clean.blanks,
                "dropped duplicate and blank candidates"
            );
        }
        if clean.identifiers.is_empty() {
            info!(campaigns = campaigns.len(), "no candidates, skipping");
            return report.skip(SkipReason::NoCandidates);
        }

        report.stage = RunStage::Distribution;
        let batches = partition(&clean.identifiers, campaigns.len());
        for (campaign, batch) in campaigns.iter().zip(batches) {
            let campaign_report = self.assign_campaign(campaign, batch, dry_run).await;
            report.campaigns.push(campaign_report);
        }

        let report = report.complete();
        info!(
            run_id = %report.run_id,
            campaigns = report.campaigns_found,
            candidates = report.candidates_found,
            distributed = report.users_distributed,
            dry_run,
            "daily assignment finished"
        );
        report
    }

    /// Spread one campaign's batch over its persisted groups, keeping each
    /// group's stored kind and tab metadata. A dry run stops before the writer.
    async fn assign_campaign(
        &self,
        campaign: &Campaign,
        batch: &[String],
        dry_run: bool,
    ) -> CampaignReport {
        let mut report = CampaignReport {
            base_id: campaign.base_id.clone(),
            name: campaign.name.clone(),
            allocated: batch.len(),
            users_distributed: 0,
            skipped_no_groups: false,
            error: None,
            groups: Vec::new(),
        };

        let groups = match self.store.campaign_groups(&campaign.base_id).await {
            Ok(groups) => groups,
            Err(e) => {
                error!(campaign = %campaign.base_id, error = %e, "failed to load campaign groups");
                report.error = Some(e.to_string());
                return report;
            }
        };
        if groups.is_empty() {
            warn!(campaign = %campaign.base_id, allocated = batch.len(), "campaign has no groups, skipped");
            report.skipped_no_groups = true;
            return report;
        }

        for (group, chunk) in groups.iter().zip(partition(batch, groups.len())) {
            let outcome = if dry_run {
                None
            } else {
                let target = GroupTarget::for_group(group, campaign.start_date, campaign.end_date);
                let outcome = self.writer.write(&target, chunk).await;
                report.users_distributed += outcome.primary_inserted_count();
                Some(outcome)
            };
            report.groups.push(GroupReport {
                sub_id: group.sub_id.clone(),
                kind: group.kind,
                allocated: chunk.len(),
                outcome,
            });
        }

        info!(
            campaign = %campaign.base_id,
            allocated = report.allocated,
            distributed = report.users_distributed,
            groups = report.groups.len(),
            "campaign assigned"
        );
        report
    }
}
