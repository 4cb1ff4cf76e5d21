//! Daily run configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Settings for the daily assignment run and campaign creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    /// Offset of the business day from UTC, in minutes (Asia/Almaty is +300)
    pub utc_offset_minutes: i32,
    /// Member table for control groups
    pub control_sink: String,
    /// Member table for target groups
    pub target_sink: String,
    /// Mirror table for target groups
    pub mirror_sink: String,
    /// Tag stamped on every member row
    pub load_tag: String,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 300,
            control_sink: "control_members".to_string(),
            target_sink: "target_members".to_string(),
            mirror_sink: "target_members_mirror".to_string(),
            load_tag: "cohorts".to_string(),
        }
    }
}

impl DailyConfig {
    /// Configured offset, falling back to UTC when out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }

    /// Business day of `now` in the configured offset.
    pub fn business_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    /// Today's business day.
    pub fn today(&self) -> NaiveDate {
        self.business_day(Utc::now())
    }
}
