//! Import newly-qualifying identifiers for the daily run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::ConfigLoader;
use crate::storage::open_store;

/// Candidate management arguments.
#[derive(Args, Debug)]
pub struct CandidatesArgs {
    #[command(subcommand)]
    pub command: CandidatesCommands,
}

/// Candidate subcommands.
#[derive(Subcommand, Debug)]
pub enum CandidatesCommands {
    /// Import identifiers from a text file, one per line
    Import {
        /// Input file
        file: PathBuf,

        /// Qualification day (defaults to today in the configured offset)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Run candidates command.
pub async fn run(args: CandidatesArgs) -> Result<()> {
    match args.command {
        CandidatesCommands::Import { file, date } => import(&file, date).await,
    }
}

/// Non-empty trimmed lines of `contents`.
fn read_identifiers(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

async fn import(file: &Path, date: Option<NaiveDate>) -> Result<()> {
    let config = ConfigLoader::load()?;
    let day = date.unwrap_or_else(|| config.daily.today());

    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let identifiers = read_identifiers(&contents);

    let store = open_store(&config.storage).await?;
    let imported = store.import_candidates(day, &identifiers).await?;
    info!(day = %day, imported, "candidates imported");
    println!("Imported {imported} candidates for {day}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_identifiers_skips_blank_lines() {
        let ids = read_identifiers("900101300123\n\n  900101300456  \r\n\t\n");
        assert_eq!(ids, vec!["900101300123", "900101300456"]);
    }
}
