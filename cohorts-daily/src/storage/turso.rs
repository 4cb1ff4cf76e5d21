//! Turso/libSQL implementation of campaign storage.
//!
//! This module provides persistent storage using Turso (libSQL).
//! It can connect to:
//! - Remote Turso database (cloud)
//! - Local embedded SQLite file
//! - In-memory database (tests)
//!
//! Member tables are named by configuration, so their names are checked
//! against a strict identifier pattern before they reach any SQL text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Builder, Connection, Database};
use tracing::{debug, instrument};

use cohorts_core::GroupKind;

use super::{CampaignStore, CandidateSource, Error, MemberRow, MemberSink, Result};
use crate::types::{Campaign, CampaignGroup, TabMetadata, format_base_id, parse_base_id, parse_sub_id};

/// SQL schema for the campaigns table.
const SCHEMA_CAMPAIGNS: &str = r#"
CREATE TABLE IF NOT EXISTS campaigns (
    base_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    description TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL
)
"#;

/// SQL schema for campaign sub-groups. `kind` is nullable for rows written
/// before it existed; those fall back to the sub-id suffix.
const SCHEMA_CAMPAIGN_GROUPS: &str = r#"
CREATE TABLE IF NOT EXISTS campaign_groups (
    sub_id TEXT PRIMARY KEY,
    base_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    kind TEXT,
    tab1 TEXT,
    tab2 TEXT,
    tab3 TEXT,
    tab4 TEXT,
    tab5 TEXT
)
"#;

/// SQL index for sub-group lookups by campaign.
const INDEX_CAMPAIGN_GROUPS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_campaign_groups_base
ON campaign_groups(base_id, ordinal)
"#;

/// SQL schema for the candidates table.
const SCHEMA_CANDIDATES: &str = r#"
CREATE TABLE IF NOT EXISTS candidates (
    identifier TEXT NOT NULL,
    qualified_on TEXT NOT NULL,
    imported_at TEXT NOT NULL
)
"#;

/// SQL index for candidate lookups by day.
const INDEX_CANDIDATES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_candidates_day
ON candidates(qualified_on)
"#;

const CAMPAIGN_COLUMNS: &str = "base_id, name, start_date, end_date, description, created_by";
const GROUP_COLUMNS: &str = "sub_id, base_id, ordinal, kind, tab1, tab2, tab3, tab4, tab5";

/// Turso-backed campaign and candidate storage.
///
/// Holds one connection for its lifetime so an in-memory database is shared
/// by every query and by the member sinks created from it.
#[derive(Clone)]
pub struct TursoCampaignStore {
    _db: Arc<Database>,
    conn: Connection,
}

impl TursoCampaignStore {
    /// Create a new store with a local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::open(db).await
    }

    /// Create a new store connected to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        Self::open(db).await
    }

    /// Create a new in-memory store (for testing).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db).await
    }

    async fn open(db: Database) -> Result<Self> {
        let conn = db.connect()?;
        let store = Self {
            _db: Arc::new(db),
            conn,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Get a database connection.
    fn conn(&self) -> Connection {
        self.conn.clone()
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute(SCHEMA_CAMPAIGNS, ()).await?;
        conn.execute(SCHEMA_CAMPAIGN_GROUPS, ()).await?;
        conn.execute(INDEX_CAMPAIGN_GROUPS, ()).await?;
        conn.execute(SCHEMA_CANDIDATES, ()).await?;
        conn.execute(INDEX_CANDIDATES, ()).await?;
        Ok(())
    }

    /// Open (creating if needed) a member table as a sink.
    pub async fn member_sink(&self, table: &str) -> Result<TursoMemberSink> {
        validate_table_name(table)?;
        let conn = self.conn();
        conn.execute(&member_table_schema(table), ()).await?;
        Ok(TursoMemberSink {
            _db: self._db.clone(),
            conn,
            table: table.to_string(),
        })
    }

    /// Record identifiers that qualify on `day`. Returns the number stored.
    #[instrument(skip(self, identifiers), fields(count = identifiers.len()), level = "debug")]
    pub async fn import_candidates(&self, day: NaiveDate, identifiers: &[String]) -> Result<usize> {
        let conn = self.conn();
        let tx = conn.transaction().await?;
        let imported_at = format_datetime(Utc::now());
        for identifier in identifiers {
            tx.execute(
                "INSERT INTO candidates (identifier, qualified_on, imported_at) VALUES (?, ?, ?)",
                libsql::params![identifier.clone(), format_date(day), imported_at.clone()],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(identifiers.len())
    }

    /// Parse a campaign from a database row.
    fn parse_campaign(row: &libsql::Row) -> Result<Campaign> {
        let base_id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let start_str: String = row.get(2)?;
        let end_str: String = row.get(3)?;

        Ok(Campaign {
            base_id,
            name,
            start_date: parse_date(&start_str)?,
            end_date: parse_date(&end_str)?,
            description: row.get(4)?,
            created_by: row.get(5)?,
        })
    }

    /// Parse a sub-group from a database row.
    fn parse_group(row: &libsql::Row) -> Result<CampaignGroup> {
        let sub_id: String = row.get(0)?;
        let base_id: String = row.get(1)?;
        let ordinal: i64 = row.get(2)?;
        let kind_str: Option<String> = row.get(3)?;
        let tab_metadata = TabMetadata {
            tab1: row.get(4)?,
            tab2: row.get(5)?,
            tab3: row.get(6)?,
            tab4: row.get(7)?,
            tab5: row.get(8)?,
        };

        let ordinal = u32::try_from(ordinal)
            .map_err(|_| Error::InvalidData(format!("invalid ordinal {ordinal} for {sub_id}")))?;
        let kind = match kind_str {
            Some(s) => GroupKind::parse(&s)
                .ok_or_else(|| Error::InvalidData(format!("invalid group kind: {s}")))?,
            None => {
                let (_, suffix) = parse_sub_id(&sub_id)
                    .ok_or_else(|| Error::InvalidData(format!("invalid sub id: {sub_id}")))?;
                debug!(%sub_id, "group kind not stored, derived from sub id");
                GroupKind::for_ordinal(suffix)
            }
        };

        Ok(CampaignGroup {
            sub_id,
            base_id,
            ordinal,
            kind,
            tab_metadata,
        })
    }
}

#[async_trait]
impl CampaignStore for TursoCampaignStore {
    #[instrument(skip(self), level = "debug")]
    async fn active_campaigns(&self, day: NaiveDate) -> Result<Vec<Campaign>> {
        let conn = self.conn();
        let day = format_date(day);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE start_date <= ? AND end_date >= ? ORDER BY base_id ASC"
                ),
                libsql::params![day.clone(), day],
            )
            .await?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows.next().await? {
            campaigns.push(Self::parse_campaign(&row)?);
        }
        Ok(campaigns)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY base_id DESC"),
                (),
            )
            .await?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows.next().await? {
            campaigns.push(Self::parse_campaign(&row)?);
        }
        Ok(campaigns)
    }

    #[instrument(skip(self), level = "debug")]
    async fn campaign_groups(&self, base_id: &str) -> Result<Vec<CampaignGroup>> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {GROUP_COLUMNS} FROM campaign_groups WHERE base_id = ? ORDER BY ordinal ASC"
                ),
                [base_id],
            )
            .await?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().await? {
            groups.push(Self::parse_group(&row)?);
        }
        Ok(groups)
    }

    #[instrument(skip(self, groups), fields(base_id = %campaign.base_id, groups = groups.len()), level = "debug")]
    async fn create_campaign(&self, campaign: &Campaign, groups: &[CampaignGroup]) -> Result<()> {
        if let Some(stray) = groups.iter().find(|g| g.base_id != campaign.base_id) {
            return Err(Error::InvalidData(format!(
                "group {} does not belong to campaign {}",
                stray.sub_id, campaign.base_id
            )));
        }

        let conn = self.conn();
        let tx = conn.transaction().await?;
        tx.execute(
            "INSERT INTO campaigns (base_id, name, start_date, end_date, description, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                campaign.base_id.clone(),
                campaign.name.clone(),
                format_date(campaign.start_date),
                format_date(campaign.end_date),
                campaign.description.clone(),
                campaign.created_by.clone(),
                format_datetime(Utc::now())
            ],
        )
        .await?;

        for group in groups {
            let tabs = &group.tab_metadata;
            tx.execute(
                "INSERT INTO campaign_groups (sub_id, base_id, ordinal, kind, tab1, tab2, tab3, tab4, tab5) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    group.sub_id.clone(),
                    group.base_id.clone(),
                    i64::from(group.ordinal),
                    group.kind.as_str(),
                    tabs.tab1.clone(),
                    tabs.tab2.clone(),
                    tabs.tab3.clone(),
                    tabs.tab4.clone(),
                    tabs.tab5.clone()
                ],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn next_base_id(&self) -> Result<String> {
        let conn = self.conn();
        let mut rows = conn.query("SELECT base_id FROM campaigns", ()).await?;

        let mut highest = 0;
        while let Some(row) = rows.next().await? {
            let base_id: String = row.get(0)?;
            if let Some(n) = parse_base_id(&base_id) {
                highest = highest.max(n);
            }
        }
        Ok(format_base_id(highest + 1))
    }
}

#[async_trait]
impl CandidateSource for TursoCampaignStore {
    #[instrument(skip(self), level = "debug")]
    async fn candidates(&self, day: NaiveDate) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT identifier FROM candidates WHERE qualified_on = ? ORDER BY rowid ASC",
                [format_date(day)],
            )
            .await?;

        let mut identifiers = Vec::new();
        while let Some(row) = rows.next().await? {
            identifiers.push(row.get::<String>(0)?);
        }
        Ok(identifiers)
    }
}

/// A libSQL member table. Keeps its database open after the store is dropped.
#[derive(Clone)]
pub struct TursoMemberSink {
    _db: Arc<Database>,
    conn: Connection,
    table: String,
}

impl TursoMemberSink {
    /// Identifiers stored for `sub_id`, in insertion order.
    pub async fn identifiers(&self, sub_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT identifier FROM {} WHERE sub_id = ? ORDER BY rowid ASC", self.table),
                [sub_id],
            )
            .await?;

        let mut identifiers = Vec::new();
        while let Some(row) = rows.next().await? {
            identifiers.push(row.get::<String>(0)?);
        }
        Ok(identifiers)
    }

    /// Total rows in the table.
    pub async fn count(&self) -> Result<u64> {
        let rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {}", self.table), ())
            .await?;
        read_count(rows).await
    }

    /// Rows stored for one sub-group.
    pub async fn count_sub_group(&self, sub_id: &str) -> Result<u64> {
        let rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM {} WHERE sub_id = ?", self.table),
                [sub_id],
            )
            .await?;
        read_count(rows).await
    }
}

#[async_trait]
impl MemberSink for TursoMemberSink {
    fn name(&self) -> &str {
        &self.table
    }

    async fn insert(&self, row: &MemberRow) -> Result<()> {
        let tabs = &row.tab_metadata;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (identifier, sub_id, kind, start_date, end_date, tab1, tab2, tab3, tab4, tab5, load_tag, loaded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.table
                ),
                libsql::params![
                    row.identifier.clone(),
                    row.sub_id.clone(),
                    row.kind.as_str(),
                    format_date(row.start_date),
                    format_date(row.end_date),
                    tabs.tab1.clone(),
                    tabs.tab2.clone(),
                    tabs.tab3.clone(),
                    tabs.tab4.clone(),
                    tabs.tab5.clone(),
                    row.load_tag.clone(),
                    format_datetime(row.loaded_at)
                ],
            )
            .await?;
        Ok(())
    }
}

async fn read_count(mut rows: libsql::Rows) -> Result<u64> {
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?.max(0) as u64),
        None => Ok(0),
    }
}

fn member_table_schema(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    identifier TEXT NOT NULL,
    sub_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    tab1 TEXT,
    tab2 TEXT,
    tab3 TEXT,
    tab4 TEXT,
    tab5 TEXT,
    load_tag TEXT NOT NULL,
    loaded_at TEXT NOT NULL
)"
    )
}

/// Table names must be plain SQL identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidData(format!("invalid table name: {name:?}")))
    }
}

/// Format a date for storage.
fn format_date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Parse a date from storage.
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::InvalidData(format!("invalid date: {}", s)))
}

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
