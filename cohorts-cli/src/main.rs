use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;
mod storage;

#[derive(Parser)]
#[command(name = "cohorts", about = "Balanced campaign cohorts and daily assignment")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a population into balanced groups
    Stratify(commands::stratify::StratifyArgs),
    /// Create and list campaigns
    Campaign(commands::campaign::CampaignArgs),
    /// Manage newly-qualifying candidates
    Candidates(commands::candidates::CandidatesArgs),
    /// Daily incremental assignment
    Daily(commands::daily::DailyArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    match cli.command {
        Commands::Stratify(args) => commands::stratify::run(args),
        Commands::Campaign(args) => commands::campaign::run(args).await,
        Commands::Candidates(args) => commands::candidates::run(args).await,
        Commands::Daily(args) => commands::daily::run(args).await,
        Commands::Config(args) => commands::config::run(args),
    }
}
