//! Storage traits and implementations for campaigns, candidates and members.
//!
//! - [`CampaignStore`] - campaign and sub-group metadata (read by the daily run)
//! - [`CandidateSource`] - identifiers that newly qualify on a given day
//! - [`MemberSink`] - one destination table for group members
//!
//! The Turso implementations store everything in libSQL.

mod error;
mod turso;

pub use error::{Error, Result};
pub use turso::{TursoCampaignStore, TursoMemberSink};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cohorts_core::GroupKind;

use crate::types::{Campaign, CampaignGroup, TabMetadata};

/// Campaign metadata. Sub-groups are written once at creation and only read
/// afterwards.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Campaigns with `start_date <= day <= end_date`, ordered by base id.
    async fn active_campaigns(&self, day: NaiveDate) -> Result<Vec<Campaign>>;

    /// All campaigns, newest first.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Persisted sub-groups of a campaign, ordered by ordinal. Empty when the
    /// campaign has none.
    async fn campaign_groups(&self, base_id: &str) -> Result<Vec<CampaignGroup>>;

    /// Persist a campaign and its sub-groups in one transaction.
    async fn create_campaign(&self, campaign: &Campaign, groups: &[CampaignGroup]) -> Result<()>;

    /// Next unused base id (`SC` + 8 digits).
    async fn next_base_id(&self) -> Result<String>;
}

/// Source of newly-qualifying identifiers.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Identifiers that qualify on `day`, in source order. May contain blanks
    /// and duplicates; the caller cleans them.
    async fn candidates(&self, day: NaiveDate) -> Result<Vec<String>>;
}

/// One member row as written to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub identifier: String,
    pub sub_id: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tab_metadata: TabMetadata,
    pub load_tag: String,
    pub loaded_at: DateTime<Utc>,
}

/// A destination for member rows. Each row is written individually so one
/// bad row cannot fail the rest.
#[async_trait]
pub trait MemberSink: Send + Sync {
    /// Name used in outcomes and logs.
    fn name(&self) -> &str;

    async fn insert(&self, row: &MemberRow) -> Result<()>;
}

/// Stands in for a sink whose database could not be opened. Every insert
/// fails with [`Error::SinkUnavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableSink {
    name: String,
    message: String,
}

impl UnavailableSink {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl MemberSink for UnavailableSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, _row: &MemberRow) -> Result<()> {
        Err(Error::SinkUnavailable {
            sink: self.name.clone(),
            message: self.message.clone(),
        })
    }
}
