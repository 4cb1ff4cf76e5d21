//! Campaign commands: create from a stratification request, list.

use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use cohorts_core::{GroupKind, StratificationEngine};
use cohorts_daily::{Campaign, CampaignPlan, CampaignStore, TabMetadata};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::commands::stratify::stratify;
use crate::config::ConfigLoader;
use crate::output;
use crate::storage::{open_store, open_writer};

/// Campaign management arguments.
#[derive(Args, Debug)]
pub struct CampaignArgs {
    #[command(subcommand)]
    pub command: CampaignCommands,
}

/// Campaign subcommands.
#[derive(Subcommand, Debug)]
pub enum CampaignCommands {
    /// Stratify a population and persist the groups as a new campaign
    Create {
        /// JSON stratification request (`-` reads stdin)
        request: PathBuf,

        /// Campaign name
        #[arg(short, long)]
        name: String,

        /// First day of the campaign (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the campaign (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Hypothesis or notes for the campaign
        #[arg(short, long)]
        description: Option<String>,

        /// Who created the campaign
        #[arg(long)]
        created_by: Option<String>,

        /// Tab values for one group, comma separated; repeat once per group
        #[arg(long = "tabs")]
        tabs: Vec<String>,

        /// Print the creation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List campaigns, newest first
    List {
        /// Only campaigns active on this day
        #[arg(long)]
        active_on: Option<NaiveDate>,
    },
}

/// Run campaign command.
pub async fn run(args: CampaignArgs) -> Result<()> {
    match args.command {
        CampaignCommands::Create {
            request,
            name,
            start,
            end,
            description,
            created_by,
            tabs,
            json,
        } => {
            let campaign = NewCampaign {
                name,
                start,
                end,
                description,
                created_by,
            };
            create_campaign(request, campaign, &tabs, json).await
        }
        CampaignCommands::List { active_on } => list_campaigns(active_on).await,
    }
}

/// Parse `--tabs "a,b"` values into per-group metadata.
fn parse_tabs(values: &[String]) -> Result<Vec<TabMetadata>> {
    values
        .iter()
        .map(|value| {
            let parts: Vec<&str> = value.split(',').map(str::trim).collect();
            if parts.len() > 5 {
                bail!("at most 5 tab values per group, got {} in '{value}'", parts.len());
            }
            Ok(TabMetadata::from_values(
                parts.into_iter().filter(|p| !p.is_empty()),
            ))
        })
        .collect()
}

/// Campaign fields given on the command line.
struct NewCampaign {
    name: String,
    start: NaiveDate,
    end: NaiveDate,
    description: Option<String>,
    created_by: Option<String>,
}

async fn create_campaign(
    request: PathBuf,
    new: NewCampaign,
    tabs: &[String],
    json: bool,
) -> Result<()> {
    if new.start > new.end {
        bail!("campaign start {} is after its end {}", new.start, new.end);
    }
    let tabs = parse_tabs(tabs)?;

    let config = ConfigLoader::load()?;
    let engine = StratificationEngine::new(config.engine);
    let response = stratify(&engine, &request)?;

    let store = open_store(&config.storage).await?;
    let writer = open_writer(&store, &config.storage, &config.daily).await?;
    let campaign = Campaign {
        base_id: store.next_base_id().await?,
        name: new.name,
        start_date: new.start,
        end_date: new.end,
        description: new.description,
        created_by: new.created_by,
    };

    let plan = CampaignPlan::from_response(campaign, &response, &tabs)?;
    let report = plan.persist(&store, &writer).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_campaign_report(&report);
    }
    Ok(())
}

async fn list_campaigns(active_on: Option<NaiveDate>) -> Result<()> {
    let config = ConfigLoader::load()?;
    let store = open_store(&config.storage).await?;

    let campaigns = match active_on {
        Some(day) => store.active_campaigns(day).await?,
        None => store.list_campaigns().await?,
    };
    if campaigns.is_empty() {
        println!("No campaigns found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Base id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Start").fg(Color::Cyan),
        Cell::new("End").fg(Color::Cyan),
        Cell::new("Groups").fg(Color::Cyan),
        Cell::new("Members").fg(Color::Cyan),
        Cell::new("Created by").fg(Color::Cyan),
    ]);

    let control = store.member_sink(&config.daily.control_sink).await?;
    let target = store.member_sink(&config.daily.target_sink).await?;
    let today = config.daily.today();
    for campaign in &campaigns {
        let groups = store.campaign_groups(&campaign.base_id).await?;
        let kinds: Vec<&str> = groups.iter().map(|g| g.kind.as_str()).collect();
        let mut members = 0;
        for group in &groups {
            let sink = match group.kind {
                GroupKind::Control => &control,
                GroupKind::Target => &target,
            };
            members += sink.count_sub_group(&group.sub_id).await?;
        }
        let name = if campaign.is_active_on(today) {
            Cell::new(&campaign.name).fg(Color::Green)
        } else {
            Cell::new(&campaign.name)
        };
        table.add_row(vec![
            Cell::new(&campaign.base_id),
            name,
            Cell::new(campaign.start_date),
            Cell::new(campaign.end_date),
            Cell::new(kinds.join(", ")),
            Cell::new(members),
            Cell::new(campaign.created_by.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    Ok(())
}
