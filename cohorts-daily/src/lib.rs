//! cohorts-daily - campaigns, member sinks and the daily assignment run
//!
//! Campaigns are created once from a stratification result ([`CampaignPlan`])
//! and then grow every day: [`CohortAssigner`] takes the day's
//! newly-qualifying identifiers, splits them evenly across active campaigns
//! and then across each campaign's existing groups, and writes them through a
//! [`DualSinkWriter`].

pub mod assigner;
pub mod config;
pub mod distribute;
pub mod plan;
pub mod report;
pub mod storage;
pub mod types;
pub mod writer;

pub use assigner::CohortAssigner;
pub use config::DailyConfig;
pub use distribute::{CleanIdentifiers, clean_identifiers, partition, split_evenly};
pub use plan::{CampaignPlan, PlannedGroup};
pub use report::{CampaignReport, GroupReport, RunReport, RunStage, RunStatus, SkipReason};
pub use storage::{
    CampaignStore, CandidateSource, MemberRow, MemberSink, TursoCampaignStore, TursoMemberSink,
    UnavailableSink,
};
pub use types::{Campaign, CampaignGroup, TabMetadata};
pub use writer::{DualSinkWriter, GroupTarget, SinkOutcome, WriteOutcome};
