//! Daily incremental assignment.

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use cohorts_daily::CohortAssigner;

use crate::config::ConfigLoader;
use crate::output;
use crate::storage::{open_store, open_writer};

/// Daily run arguments.
#[derive(Args, Debug)]
pub struct DailyArgs {
    #[command(subcommand)]
    pub command: DailyCommands,
}

/// Daily subcommands.
#[derive(Subcommand, Debug)]
pub enum DailyCommands {
    /// Assign the day's candidates to every active campaign
    ///
    /// Only one run may execute at a time; schedule it from a single host.
    Run {
        /// Business day to run for (defaults to today in the configured offset)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Compute and print the allocations without writing any member
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run daily command.
pub async fn run(args: DailyArgs) -> Result<()> {
    match args.command {
        DailyCommands::Run {
            date,
            dry_run,
            json,
        } => run_daily(date, dry_run, json).await,
    }
}

async fn run_daily(date: Option<NaiveDate>, dry_run: bool, json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let store = open_store(&config.storage).await?;
    let writer = open_writer(&store, &config.storage, &config.daily).await?;

    let day = date.unwrap_or_else(|| config.daily.today());
    let store = Arc::new(store);
    let assigner = CohortAssigner::new(store.clone(), store, writer, config.daily);
    let report = if dry_run {
        assigner.preview(day).await
    } else {
        assigner.run_for(day).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_run_report(&report);
    }

    if !report.success {
        bail!(
            "daily run failed: {}",
            report.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
