//! Dual-sink member writes.
//!
//! Control members go to the control sink. Target members go to the primary
//! target sink and are mirrored to a secondary sink. Every identifier is a
//! separate write: failures are counted and logged, never raised. A target
//! write succeeds when the primary sink does, whatever happens to the
//! mirror.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use cohorts_core::GroupKind;

use crate::storage::{MemberRow, MemberSink};
use crate::types::{CampaignGroup, TabMetadata};

/// Where and how a batch of identifiers is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTarget {
    pub sub_id: String,
    pub kind: GroupKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tab_metadata: TabMetadata,
}

impl GroupTarget {
    /// Target for a persisted group of a campaign running `start..=end`.
    pub fn for_group(group: &CampaignGroup, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            sub_id: group.sub_id.clone(),
            kind: group.kind,
            start_date,
            end_date,
            tab_metadata: group.tab_metadata.clone(),
        }
    }
}

/// Result of writing one batch to one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOutcome {
    pub sink: String,
    pub attempted: usize,
    pub inserted_count: usize,
    pub failed_count: usize,
    /// False only when there was something to write and nothing was written
    pub success: bool,
    /// First failure message, if any write failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of writing one batch for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub sub_id: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    /// Control sink for control groups, primary target sink otherwise
    pub primary: SinkOutcome,
    /// Mirror sink; present for target groups only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SinkOutcome>,
    /// Follows the primary sink only
    pub success: bool,
}

impl WriteOutcome {
    pub fn primary_inserted_count(&self) -> usize {
        self.primary.inserted_count
    }

    pub fn secondary_inserted_count(&self) -> usize {
        self.secondary.as_ref().map_or(0, |s| s.inserted_count)
    }
}

/// Routes group members to the control, target and mirror sinks.
#[derive(Clone)]
pub struct DualSinkWriter {
    control: Arc<dyn MemberSink>,
    target: Arc<dyn MemberSink>,
    mirror: Arc<dyn MemberSink>,
    load_tag: String,
}

impl DualSinkWriter {
    pub fn new(
        control: Arc<dyn MemberSink>,
        target: Arc<dyn MemberSink>,
        mirror: Arc<dyn MemberSink>,
        load_tag: impl Into<String>,
    ) -> Self {
        Self {
            control,
            target,
            mirror,
            load_tag: load_tag.into(),
        }
    }

    /// Write `identifiers` for `group`, routed by its kind.
    pub async fn write(&self, group: &GroupTarget, identifiers: &[String]) -> WriteOutcome {
        match group.kind {
            GroupKind::Control => {
                let primary = self.write_control(group, identifiers).await;
                WriteOutcome {
                    sub_id: group.sub_id.clone(),
                    kind: group.kind,
                    success: primary.success,
                    primary,
                    secondary: None,
                }
            }
            GroupKind::Target => self.write_target(group, identifiers).await,
        }
    }

    /// Write to the control sink only.
    pub async fn write_control(&self, group: &GroupTarget, identifiers: &[String]) -> SinkOutcome {
        write_all(self.control.as_ref(), group, identifiers, &self.load_tag).await
    }

    /// Write to the primary target sink, then mirror to the secondary sink.
    pub async fn write_target(&self, group: &GroupTarget, identifiers: &[String]) -> WriteOutcome {
        let primary = write_all(self.target.as_ref(), group, identifiers, &self.load_tag).await;
        let secondary = write_all(self.mirror.as_ref(), group, identifiers, &self.load_tag).await;
        if primary.success && !secondary.success {
            warn!(
                sub_id = %group.sub_id,
                mirror = %secondary.sink,
                error = secondary.error.as_deref().unwrap_or(""),
                "mirror write failed, primary write kept"
            );
        }
        WriteOutcome {
            sub_id: group.sub_id.clone(),
            kind: group.kind,
            success: primary.success,
            primary,
            secondary: Some(secondary),
        }
    }
}

async fn write_all(
    sink: &dyn MemberSink,
    group: &GroupTarget,
    identifiers: &[String],
    load_tag: &str,
) -> SinkOutcome {
    let loaded_at = Utc::now();
    let mut inserted = 0;
    let mut first_error = None;

    for identifier in identifiers {
        let row = MemberRow {
            identifier: identifier.clone(),
            sub_id: group.sub_id.clone(),
            kind: group.kind,
            start_date: group.start_date,
            end_date: group.end_date,
            tab_metadata: group.tab_metadata.clone(),
            load_tag: load_tag.to_string(),
            loaded_at,
        };
        match sink.insert(&row).await {
            Ok(()) => inserted += 1,
            Err(e) => {
                warn!(sink = sink.name(), sub_id = %group.sub_id, %identifier, error = %e, "member write failed");
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    let attempted = identifiers.len();
    let failed = attempted - inserted;
    let success = attempted == 0 || inserted > 0;
    if success {
        info!(sink = sink.name(), sub_id = %group.sub_id, inserted, failed, "members written");
    } else {
        error!(sink = sink.name(), sub_id = %group.sub_id, attempted, "every member write failed");
    }

    SinkOutcome {
        sink: sink.name().to_string(),
        attempted,
        inserted_count: inserted,
        failed_count: failed,
        success,
        error: first_error,
    }
}
