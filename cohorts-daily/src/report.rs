//! Daily run report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cohorts_core::GroupKind;

use crate::writer::WriteOutcome;

/// Terminal state of a daily run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every active campaign was processed, fully or partially
    Completed,
    SkippedNoCampaigns,
    SkippedNoCandidates,
    /// An unexpected error stopped the run before any campaign was processed
    Failed,
}

/// Step the run was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    FetchCampaigns,
    FetchCandidates,
    Distribution,
    Finished,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchCampaigns => "fetch_campaigns",
            Self::FetchCandidates => "fetch_candidates",
            Self::Distribution => "distribution",
            Self::Finished => "finished",
        }
    }
}

/// Why a run had nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoActiveCampaigns,
    NoCandidates,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoActiveCampaigns => "no_active_campaigns",
            Self::NoCandidates => "no_candidates",
        }
    }
}

/// One group's share of a campaign's batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub sub_id: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub allocated: usize,
    /// Absent on dry runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WriteOutcome>,
}

/// One campaign's share of the day's batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub base_id: String,
    pub name: String,
    pub allocated: usize,
    pub users_distributed: usize,
    /// The campaign had no persisted groups, so nothing was written
    pub skipped_no_groups: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub groups: Vec<GroupReport>,
}

/// Structured result of one daily run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    /// Allocations were computed but nothing was written
    #[serde(default)]
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stage: RunStage,
    /// True unless the run failed; skips are successful
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub campaigns_found: usize,
    /// Distinct, non-blank candidates
    pub candidates_found: usize,
    pub duplicates_dropped: usize,
    pub blanks_dropped: usize,
    pub users_distributed: usize,
    pub campaigns: Vec<CampaignReport>,
}

impl RunReport {
    pub(crate) fn start(run_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            run_date,
            dry_run: false,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Completed,
            stage: RunStage::FetchCampaigns,
            success: true,
            skip_reason: None,
            error_message: None,
            campaigns_found: 0,
            candidates_found: 0,
            duplicates_dropped: 0,
            blanks_dropped: 0,
            users_distributed: 0,
            campaigns: Vec::new(),
        }
    }

    pub(crate) fn skip(mut self, reason: SkipReason) -> Self {
        self.status = match reason {
            SkipReason::NoActiveCampaigns => RunStatus::SkippedNoCampaigns,
            SkipReason::NoCandidates => RunStatus::SkippedNoCandidates,
        };
        self.skip_reason = Some(reason);
        self.finish()
    }

    pub(crate) fn fail(mut self, message: String) -> Self {
        self.status = RunStatus::Failed;
        self.success = false;
        self.error_message = Some(format!("[{}] {message}", self.stage.as_str()));
        self.finish()
    }

    pub(crate) fn complete(mut self) -> Self {
        self.status = RunStatus::Completed;
        self.users_distributed = self.campaigns.iter().map(|c| c.users_distributed).sum();
        self.stage = RunStage::Finished;
        self.finish()
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}
