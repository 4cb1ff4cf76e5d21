//! Campaign and sub-group types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cohorts_core::GroupKind;

/// Prefix of every campaign base id.
pub const BASE_ID_PREFIX: &str = "SC";

/// A dated experiment with one control and several target sub-groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// `SC` followed by 8 digits, e.g. `SC00000042`
    pub base_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Hypothesis or notes recorded at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Campaign {
    /// Check if `day` falls within the campaign's dates (inclusive).
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
}

/// Opaque per-group labels carried from creation to every daily write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabMetadata {
    pub tab1: Option<String>,
    pub tab2: Option<String>,
    pub tab3: Option<String>,
    pub tab4: Option<String>,
    pub tab5: Option<String>,
}

impl TabMetadata {
    /// Build from up to five values; extra values are ignored.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tabs = Self::default();
        for (i, value) in values.into_iter().take(5).enumerate() {
            let slot = match i {
                0 => &mut tabs.tab1,
                1 => &mut tabs.tab2,
                2 => &mut tabs.tab3,
                3 => &mut tabs.tab4,
                _ => &mut tabs.tab5,
            };
            *slot = Some(value.into());
        }
        tabs
    }
}

/// A persisted sub-group of a campaign, read back for daily assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignGroup {
    /// `{base_id}.{ordinal}`
    pub sub_id: String,
    pub base_id: String,
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub tab_metadata: TabMetadata,
}

impl CampaignGroup {
    /// New sub-group of `base_id` at `ordinal`, typed by [`GroupKind::for_ordinal`].
    pub fn new(base_id: &str, ordinal: u32, tab_metadata: TabMetadata) -> Self {
        Self {
            sub_id: sub_id(base_id, ordinal),
            base_id: base_id.to_string(),
            ordinal,
            kind: GroupKind::for_ordinal(ordinal),
            tab_metadata,
        }
    }
}

/// Sub-id for a group: `{base_id}.{ordinal}`.
pub fn sub_id(base_id: &str, ordinal: u32) -> String {
    format!("{base_id}.{ordinal}")
}

/// Split a sub-id into base id and ordinal.
pub fn parse_sub_id(sub_id: &str) -> Option<(&str, u32)> {
    let (base, suffix) = sub_id.rsplit_once('.')?;
    let ordinal = suffix.parse().ok()?;
    (!base.is_empty() && ordinal > 0).then_some((base, ordinal))
}

/// Base id for sequence number `n`.
pub fn format_base_id(n: u64) -> String {
    format!("{BASE_ID_PREFIX}{n:08}")
}

/// Sequence number of a base id, `None` if it doesn't follow the format.
pub fn parse_base_id(base_id: &str) -> Option<u64> {
    let digits = base_id.strip_prefix(BASE_ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
