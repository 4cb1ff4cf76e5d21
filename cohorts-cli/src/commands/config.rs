use crate::config::ConfigLoader;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration (merged)
    Show,
    /// Show configuration and database paths
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config() -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn show_paths() -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("User config:    {}", ConfigLoader::user_config_path().display());
    println!("Project config: {}", ConfigLoader::project_config_path().display());
    match (&config.storage.url, &config.storage.path) {
        (Some(url), _) => println!("Database:       {url}"),
        (None, Some(path)) => println!("Database:       {}", path.display()),
        (None, None) => println!(
            "Database:       {}",
            cohorts_paths::default_database_path().display()
        ),
    }
    if let Some(mirror) = &config.storage.mirror {
        match (&mirror.url, &mirror.path) {
            (Some(url), _) => println!("Mirror:         {url}"),
            (None, Some(path)) => println!("Mirror:         {}", path.display()),
            (None, None) => println!("Mirror:         (incomplete [storage.mirror] section)"),
        }
    }
    Ok(())
}
