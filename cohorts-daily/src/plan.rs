//! Campaign creation from a stratification result.
//!
//! Each stratification group becomes a persisted sub-group `{base_id}.{ordinal}`
//! whose kind is stored explicitly, so the daily run never has to re-derive
//! it from the sub-id.

use tracing::{info, instrument};

use cohorts_core::{GroupKind, StratificationResponse};

use crate::distribute::clean_identifiers;
use crate::report::{CampaignReport, GroupReport};
use crate::storage::{CampaignStore, Error, Result};
use crate::types::{Campaign, CampaignGroup, TabMetadata};
use crate::writer::{DualSinkWriter, GroupTarget};

/// A sub-group and the identifiers to seed it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGroup {
    pub group: CampaignGroup,
    pub identifiers: Vec<String>,
}

/// A campaign ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPlan {
    pub campaign: Campaign,
    pub groups: Vec<PlannedGroup>,
}

impl CampaignPlan {
    /// Plan a campaign from `response`. `tabs[i]` labels group `i + 1`;
    /// groups without an entry get empty metadata.
    pub fn from_response(
        campaign: Campaign,
        response: &StratificationResponse,
        tabs: &[TabMetadata],
    ) -> Result<Self> {
        let column = response.identifier_column.as_deref().ok_or_else(|| {
            Error::InvalidData("stratification result has no identifier column".into())
        })?;

        let mut groups = Vec::with_capacity(response.groups.len());
        for (i, result) in response.groups.iter().enumerate() {
            if result.kind != GroupKind::for_ordinal(result.ordinal) {
                return Err(Error::InvalidData(format!(
                    "group {} is {} but ordinal {} must be {}",
                    result.ordinal,
                    result.kind,
                    result.ordinal,
                    GroupKind::for_ordinal(result.ordinal)
                )));
            }

            let values = result
                .data
                .iter()
                .filter_map(|record| record.get(column))
                .filter(|value| !value.is_blank())
                .map(|value| value.to_string());
            let clean = clean_identifiers(values);

            let tab_metadata = tabs.get(i).cloned().unwrap_or_default();
            groups.push(PlannedGroup {
                group: CampaignGroup::new(&campaign.base_id, result.ordinal, tab_metadata),
                identifiers: clean.identifiers,
            });
        }

        Ok(Self { campaign, groups })
    }

    /// Total identifiers across all groups.
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.identifiers.len()).sum()
    }

    /// Persist the campaign and its groups, then write every group's members.
    /// Member write failures are reported, not raised.
    #[instrument(skip_all, fields(base_id = %self.campaign.base_id))]
    pub async fn persist(
        &self,
        store: &dyn CampaignStore,
        writer: &DualSinkWriter,
    ) -> Result<CampaignReport> {
        let groups: Vec<CampaignGroup> = self.groups.iter().map(|g| g.group.clone()).collect();
        store.create_campaign(&self.campaign, &groups).await?;

        let mut report = CampaignReport {
            base_id: self.campaign.base_id.clone(),
            name: self.campaign.name.clone(),
            allocated: self.member_count(),
            users_distributed: 0,
            skipped_no_groups: groups.is_empty(),
            error: None,
            groups: Vec::new(),
        };
        for planned in &self.groups {
            let target =
                GroupTarget::for_group(&planned.group, self.campaign.start_date, self.campaign.end_date);
            let outcome = writer.write(&target, &planned.identifiers).await;
            report.users_distributed += outcome.primary_inserted_count();
            report.groups.push(GroupReport {
                sub_id: planned.group.sub_id.clone(),
                kind: planned.group.kind,
                allocated: planned.identifiers.len(),
                outcome: Some(outcome),
            });
        }

        info!(
            groups = report.groups.len(),
            members = report.users_distributed,
            "campaign created"
        );
        Ok(report)
    }
}
